//! Provides the 32-bit status convention returned by every vtable slot.
//!
//! # Examples
//! ```
//! use dyncom::hresult::HResult;
//!
//! assert!(HResult::S_OK.is_ok());
//! assert!(HResult::E_NOINTERFACE.is_err());
//! assert_eq!(HResult::E_NOTIMPL.to_string(), "0x80004001");
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Represents an `HRESULT`: zero or positive is success, negative is failure.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const S_FALSE: HResult = HResult(1);
    pub const E_NOTIMPL: HResult = HResult(0x80004001u32 as i32);
    pub const E_NOINTERFACE: HResult = HResult(0x80004002u32 as i32);
    pub const E_POINTER: HResult = HResult(0x80004003u32 as i32);
    pub const E_FAIL: HResult = HResult(0x80004005u32 as i32);
    pub const E_UNEXPECTED: HResult = HResult(0x8000FFFFu32 as i32);
    pub const E_INVALIDARG: HResult = HResult(0x80070057u32 as i32);
    pub const CLASS_E_CLASSNOTAVAILABLE: HResult = HResult(0x80040111u32 as i32);
    pub const REGDB_E_CLASSNOTREG: HResult = HResult(0x80040154u32 as i32);

    /// Reinterprets a raw slot return value.
    pub const fn from_u32(raw: u32) -> Self {
        HResult(raw as i32)
    }

    /// Returns the raw bits as a slot would return them.
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Converts a failure status into [`Error::Status`].
    ///
    /// # Examples
    /// ```
    /// use dyncom::hresult::HResult;
    ///
    /// assert!(HResult::S_FALSE.ok().is_ok());
    /// assert!(HResult::E_FAIL.ok().is_err());
    /// ```
    pub fn ok(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::Status(self))
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.as_u32())
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

#[cfg(windows)]
impl From<windows_core::HRESULT> for HResult {
    fn from(value: windows_core::HRESULT) -> Self {
        HResult(value.0)
    }
}
