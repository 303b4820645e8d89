//! Consumes objects the way native callers do: only through their vtables.
//!
//! [`ComPtr`] owns one reference on an object and releases it on drop. It
//! works on any object with an `IUnknown` prefix, whether built by this crate
//! or handed out by the platform.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::hresult::HResult;

/// The first three slots of every interface.
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: unsafe extern "system" fn(*mut c_void, *const Guid, *mut *mut c_void) -> HResult,
    pub add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    pub release: unsafe extern "system" fn(*mut c_void) -> u32,
}

/// Zero-argument slot returning a status code.
pub type StatusMethod = unsafe extern "system" fn(*mut c_void) -> HResult;

/// An owned reference on a native object.
///
/// Not `Send`: objects handed out by the platform may be apartment-bound.
pub struct ComPtr {
    ptr: NonNull<c_void>,
}

impl ComPtr {
    /// Takes ownership of a reference the caller already holds.
    ///
    /// # Safety
    /// `ptr` must be null or an object whose first word points at a vtable
    /// beginning with the `IUnknown` slots.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Acquires a new reference through `AddRef`.
    ///
    /// # Safety
    /// Same as [`ComPtr::from_raw`].
    pub unsafe fn from_raw_addref(ptr: *mut c_void) -> Option<Self> {
        let this = Self::from_raw(ptr)?;
        (this.unknown().add_ref)(ptr);
        Some(this)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// Gives up ownership without releasing.
    pub fn into_raw(self) -> *mut c_void {
        let ptr = self.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Asks the object for `iid` through its `QueryInterface` slot.
    ///
    /// # Errors
    /// [`Error::Status`] carrying the object's failure code, typically
    /// `E_NOINTERFACE`.
    pub fn query_interface(&self, iid: &Guid) -> Result<ComPtr> {
        let mut out = std::ptr::null_mut();
        // SAFETY: `self` holds a reference on a live object.
        let hr = unsafe { (self.unknown().query_interface)(self.as_ptr(), iid, &mut out) };
        hr.ok()?;
        // SAFETY: a successful QueryInterface hands out a referenced pointer.
        unsafe { ComPtr::from_raw(out) }.ok_or(Error::NullPointer("QueryInterface result"))
    }

    /// Reads the function pointer in slot `index`.
    ///
    /// # Safety
    /// The object's vtable must have at least `index + 1` slots.
    pub unsafe fn slot(&self, index: usize) -> *const c_void {
        let vtbl = *(self.as_ptr() as *const *const *const c_void);
        *vtbl.add(index)
    }

    /// Calls slot `index`, which takes no arguments after `this` and returns
    /// a status code.
    ///
    /// # Safety
    /// Slot `index` must exist and have that shape.
    pub unsafe fn call(&self, index: usize) -> HResult {
        let method: StatusMethod = std::mem::transmute(self.slot(index));
        method(self.as_ptr())
    }

    fn unknown(&self) -> &IUnknownVtbl {
        // SAFETY: construction requires an IUnknown-prefixed vtable.
        unsafe { &**(self.as_ptr() as *const *const IUnknownVtbl) }
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        // SAFETY: `self` holds a reference on a live object.
        unsafe { (self.unknown().add_ref)(self.as_ptr()) };
        Self { ptr: self.ptr }
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        // SAFETY: releases the reference this value owns.
        unsafe { (self.unknown().release)(self.as_ptr()) };
    }
}

impl fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComPtr").field(&self.as_ptr()).finish()
    }
}
