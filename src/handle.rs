//! Wraps a vtable behind the single-word object layout native callers expect.
//!
//! # Examples
//! ```
//! use dyncom::descriptor::{InterfaceDescriptor, Method};
//! use dyncom::handle::ObjectHandle;
//! use dyncom::vtable::Vtable;
//!
//! let vtable = Vtable::build(
//!     InterfaceDescriptor::new()
//!         .with(Method::new("QueryInterface", "void *This, REFIID riid, void **ppv", |_| Ok(())))
//!         .with(Method::counting("AddRef", "void *This", |_| Ok(1)))
//!         .with(Method::counting("Release", "void *This", |_| Ok(1))),
//! )
//! .unwrap();
//! let handle = ObjectHandle::wrap(vtable.clone());
//!
//! // The object's first word is the vtable's slot-0 address.
//! let first_word = unsafe { *(handle.as_ptr() as *const *const *const std::ffi::c_void) };
//! assert_eq!(first_word, vtable.as_ptr());
//! ```

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::com::helpers::RawHandle;
use crate::vtable::Vtable;

/// Number of object handles alive in this process.
static LIVE_OBJECTS: AtomicUsize = AtomicUsize::new(0);

/// Returns how many object handles are currently alive.
///
/// # Examples
/// ```
/// let _ = dyncom::handle::live_objects();
/// ```
pub fn live_objects() -> usize {
    LIVE_OBJECTS.load(Ordering::Relaxed)
}

/// Owns one object: the indirection word and a reference to its vtable.
///
/// The address returned by [`ObjectHandle::as_ptr`] never moves. Once an
/// object is handed to native code, publish it with
/// [`ObjectHandle::into_raw`] so dropping the Rust value cannot free memory
/// native callers still use.
pub struct ObjectHandle {
    raw: NonNull<RawHandle>,
}

impl ObjectHandle {
    /// Allocates the indirection word and points it at `vtable`.
    pub fn wrap(vtable: Vtable) -> Self {
        let raw = Box::new(RawHandle {
            vtbl: vtable.into_raw(),
        });
        LIVE_OBJECTS.fetch_add(1, Ordering::Relaxed);
        Self {
            raw: NonNull::from(Box::leak(raw)),
        }
    }

    /// The object address native callers pass as `this`.
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr().cast()
    }

    /// The vtable this object dispatches through.
    pub fn vtable(&self) -> Vtable {
        // SAFETY: the handle holds a reference to its vtable while alive.
        unsafe { Vtable::clone_from_raw(self.raw.as_ref().vtbl) }
    }

    /// Publishes the object. Its memory is reclaimed only by
    /// [`ObjectHandle::from_raw`].
    pub fn into_raw(self) -> *mut c_void {
        let ptr = self.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Takes back ownership of a published object. Returns `None` for null.
    ///
    /// # Safety
    /// `ptr` must come from [`ObjectHandle::into_raw`] and must not be
    /// reclaimed twice; nobody may call through it afterwards unless another
    /// owner keeps it alive.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr.cast::<RawHandle>()).map(|raw| Self { raw })
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        // SAFETY: `raw` was created by `Box::leak` in `wrap` and owns one
        // vtable reference.
        unsafe {
            let raw = Box::from_raw(self.raw.as_ptr());
            drop(Vtable::from_raw(raw.vtbl));
        }
        LIVE_OBJECTS.fetch_sub(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle").field("this", &self.as_ptr()).finish()
    }
}
