//! Provides the raw object layout and panic-free helpers used on the native
//! side of the boundary.
//!
//! # Examples
//! ```
//! use std::sync::Mutex;
//!
//! use dyncom::com::helpers::MutexExt;
//!
//! let mutex = Mutex::new(1u32);
//! let guard = mutex.lock_or_fail().expect("lock should succeed");
//! assert_eq!(*guard, 1);
//! ```

use std::ffi::c_void;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Provides panic-free `Mutex` access in code reachable from native callers.
///
/// A panic there would abort the host process, so a poisoned lock is
/// reported as [`Error::Poisoned`] instead.
///
/// # Examples
/// ```
/// use std::sync::Mutex;
///
/// use dyncom::com::helpers::MutexExt;
///
/// let mutex = Mutex::new("value");
/// let guard = mutex.lock_or_fail().expect("lock should succeed");
/// assert_eq!(*guard, "value");
/// ```
pub trait MutexExt<T> {
    /// Locks the mutex, returning [`Error::Poisoned`] instead of panicking.
    fn lock_or_fail(&self) -> Result<MutexGuard<'_, T>>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_or_fail(&self) -> Result<MutexGuard<'_, T>> {
        self.lock().map_err(|_| Error::Poisoned)
    }
}

/// Represents what native callers receive as an object pointer.
///
/// Per COM, the first (and here only) word is the vtable pointer. It points
/// at slot 0; the word just before slot 0 links back to the vtable record
/// that owns the bound handlers.
///
/// Layout:
/// ```text
/// object  -> +0: vtbl ----+
///                         v
/// vtable  -> [-1: record][0: QueryInterface][1: AddRef][2: Release][3: ...]
/// ```
#[repr(C)]
pub struct RawHandle {
    /// Address of slot 0 of the vtable.
    pub vtbl: *const *const c_void,
}

/// A raw pointer that may be stored in process-wide tables.
///
/// The pointee is a published object whose slots are safe to call from any
/// thread; only its address is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendPtr(pub *mut c_void);

// SAFETY: the pointer is only ever handed back to native callers or called
// through its vtable; no Rust data is accessed through it without the
// reference count.
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}
