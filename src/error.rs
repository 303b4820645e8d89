//! Error type shared by every module, and its mapping onto native status codes.

use thiserror::Error;

use crate::guid::Guid;
use crate::hresult::HResult;

/// Result type for dyncom operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building objects or while serving native calls.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed GUID text.
    #[error("malformed GUID {input:?}: {reason}")]
    Format { input: String, reason: String },

    /// A declared native signature has no fixed calling-convention form.
    #[error("unrepresentable native signature {signature:?}: {reason}")]
    Signature { signature: String, reason: String },

    /// An interface descriptor violates the slot layout contract.
    #[error("invalid interface descriptor: {0}")]
    Descriptor(String),

    /// Interface negotiation found no match.
    #[error("interface {0} is not supported")]
    InterfaceNotSupported(Guid),

    /// An optional operation that this layer does not provide.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Reference-count or registration misuse by the caller.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("null pointer passed as {0}")]
    NullPointer(&'static str),

    /// A handler asked for an argument that is missing or of another type.
    #[error("argument {index}: {reason}")]
    Argument { index: usize, reason: String },

    #[error("class {0} is not registered")]
    ClassNotRegistered(Guid),

    #[error("lock poisoned")]
    Poisoned,

    /// A failure status reported by native code.
    #[error("native call failed with {0}")]
    Status(HResult),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the status code that represents this error across the native
    /// boundary. The result is always a failure code: a success status
    /// carried in [`Error::Status`] becomes `E_FAIL`.
    ///
    /// # Examples
    /// ```
    /// use dyncom::error::Error;
    /// use dyncom::hresult::HResult;
    ///
    /// assert_eq!(Error::NotImplemented("LockServer").status(), HResult::E_NOTIMPL);
    /// ```
    pub fn status(&self) -> HResult {
        match self {
            Error::Format { .. } | Error::Argument { .. } => HResult::E_INVALIDARG,
            Error::InterfaceNotSupported(_) => HResult::E_NOINTERFACE,
            Error::NotImplemented(_) => HResult::E_NOTIMPL,
            Error::NullPointer(_) => HResult::E_POINTER,
            Error::Protocol(_) => HResult::E_UNEXPECTED,
            Error::ClassNotRegistered(_) => HResult::REGDB_E_CLASSNOTREG,
            Error::Status(hr) if hr.is_err() => *hr,
            Error::Status(_) => HResult::E_FAIL,
            Error::Signature { .. }
            | Error::Descriptor(_)
            | Error::Poisoned
            | Error::Io(_)
            | Error::Json(_) => HResult::E_FAIL,
        }
    }
}

#[cfg(windows)]
impl From<windows_core::Error> for Error {
    fn from(value: windows_core::Error) -> Self {
        Error::Status(HResult(value.code().0))
    }
}
