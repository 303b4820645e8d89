//! Builds native vtables whose slots forward into bound handlers.
//!
//! Every slot points at a trampoline with the exact arity the slot declares.
//! The trampoline finds the handler through the object it was called on
//! (object -> vtable -> back-link to the record), decodes the arguments,
//! runs the handler and converts the outcome to the slot's 32-bit return.
//! Neither errors nor panics cross the native boundary.
//!
//! # Examples
//! ```
//! use dyncom::descriptor::{InterfaceDescriptor, Method};
//! use dyncom::hresult::HResult;
//! use dyncom::vtable::Vtable;
//!
//! let descriptor = InterfaceDescriptor::new()
//!     .with(Method::new("QueryInterface", "void *This, REFIID riid, void **ppv", |_| {
//!         Ok(HResult::E_NOINTERFACE)
//!     }))
//!     .with(Method::counting("AddRef", "void *This", |_| Ok(1)))
//!     .with(Method::counting("Release", "void *This", |_| Ok(1)));
//!
//! let vtable = Vtable::build(descriptor).unwrap();
//! assert_eq!(vtable.len(), 3);
//! assert!(vtable.slot(2).is_some());
//! assert!(vtable.slot(3).is_none());
//! ```

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::com::helpers::RawHandle;
use crate::descriptor::{Arg, Handler, InterfaceDescriptor, Invocation, ReturnKind};
use crate::error::{Error, Result};
use crate::handle::ObjectHandle;
use crate::hresult::HResult;
use crate::signature::{Signature, MAX_ARITY};

/// Most slots one vtable may hold.
pub const MAX_SLOTS: usize = 32;

/// Names, arities and return kinds every interface must start with.
const UNKNOWN_PREFIX: [(&str, usize, ReturnKind); 3] = [
    ("QueryInterface", 2, ReturnKind::Status),
    ("AddRef", 0, ReturnKind::Count),
    ("Release", 0, ReturnKind::Count),
];

struct BoundMethod {
    name: String,
    signature: Signature,
    returns: ReturnKind,
    handler: Handler,
}

/// Owns the slot block and the handlers behind it.
///
/// `slots[0]` is the back-link to this record; `slots[1..]` is what native
/// callers see as the vtable.
struct VtableRecord {
    slots: Box<[*const c_void]>,
    methods: Vec<BoundMethod>,
}

// SAFETY: the slot block is written once during construction and only read
// afterwards; the raw pointers are code addresses and the record's own
// address. Handlers are `Send + Sync`.
unsafe impl Send for VtableRecord {}
unsafe impl Sync for VtableRecord {}

/// A built vtable. Cloning shares the same slot block.
#[derive(Clone)]
pub struct Vtable {
    record: Arc<VtableRecord>,
}

impl Vtable {
    /// Builds the slot block for `descriptor`, in declaration order.
    ///
    /// # Errors
    /// - [`Error::Signature`] if a slot's parameter list is unrepresentable.
    /// - [`Error::Descriptor`] if the descriptor has fewer than three or more
    ///   than [`MAX_SLOTS`] slots, an empty method name, or does not start
    ///   with `QueryInterface(riid, ppv)` returning a status followed by
    ///   `AddRef()` and `Release()` returning counts.
    pub fn build(descriptor: InterfaceDescriptor) -> Result<Self> {
        let methods = descriptor.into_methods();
        if methods.len() < UNKNOWN_PREFIX.len() {
            return Err(Error::Descriptor(format!(
                "{} slots declared, every interface starts with QueryInterface, AddRef, Release",
                methods.len()
            )));
        }
        if methods.len() > MAX_SLOTS {
            return Err(Error::Descriptor(format!(
                "{} slots declared, at most {MAX_SLOTS} are supported",
                methods.len()
            )));
        }

        let mut bound = Vec::with_capacity(methods.len());
        let mut thunks = Vec::with_capacity(methods.len());
        for (slot, method) in methods.into_iter().enumerate() {
            if method.name().is_empty() {
                return Err(Error::Descriptor(format!("slot {slot} has no name")));
            }
            let signature = Signature::parse(method.signature())?;
            thunks.push(thunk_for(signature.arity(), slot)?);
            bound.push(BoundMethod {
                name: method.name().to_string(),
                returns: method.returns(),
                handler: Arc::clone(method.handler()),
                signature,
            });
        }

        for (slot, (name, arity, returns)) in UNKNOWN_PREFIX.iter().enumerate() {
            let method = &bound[slot];
            if method.name != *name || method.signature.arity() != *arity {
                return Err(Error::Descriptor(format!(
                    "slot {slot} must be {name} with {arity} arguments after `this`, found {} ({})",
                    method.name, method.signature
                )));
            }
            if method.returns != *returns {
                return Err(Error::Descriptor(format!(
                    "slot {slot} ({name}) must return {returns:?}, declared {:?}",
                    method.returns
                )));
            }
        }

        let record = Arc::new_cyclic(|weak: &Weak<VtableRecord>| {
            let mut slots = Vec::with_capacity(thunks.len() + 1);
            slots.push(weak.as_ptr() as *const c_void);
            slots.extend(thunks);
            VtableRecord {
                slots: slots.into_boxed_slice(),
                methods: bound,
            }
        });

        tracing::debug!(
            slots = record.methods.len(),
            first_custom = record.methods.get(3).map(|m| m.name.as_str()),
            "built vtable"
        );
        Ok(Self { record })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.record.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.methods.is_empty()
    }

    /// Slot names in vtable order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.record.methods.iter().map(|m| m.name.as_str())
    }

    pub fn signature(&self, index: usize) -> Option<&Signature> {
        self.record.methods.get(index).map(|m| &m.signature)
    }

    /// Address of slot 0, as stored in an object's first word.
    pub fn as_ptr(&self) -> *const *const c_void {
        self.record.slots[1..].as_ptr()
    }

    /// The native function pointer in slot `index`.
    pub fn slot(&self, index: usize) -> Option<*const c_void> {
        self.record.slots.get(index + 1).copied()
    }

    /// Whether two handles share one slot block.
    pub fn ptr_eq(&self, other: &Vtable) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    /// Leaks one reference into the returned slot-0 address.
    pub(crate) fn into_raw(self) -> *const *const c_void {
        let vtbl = self.as_ptr();
        let _ = Arc::into_raw(self.record);
        vtbl
    }

    /// Takes back a reference leaked by [`Vtable::into_raw`].
    ///
    /// # Safety
    /// `vtbl` must come from `into_raw` and that reference must not be
    /// reclaimed twice.
    pub(crate) unsafe fn from_raw(vtbl: *const *const c_void) -> Self {
        let record = *vtbl.sub(1) as *const VtableRecord;
        Self {
            record: Arc::from_raw(record),
        }
    }

    /// Returns a new reference to the vtable at `vtbl` without consuming the
    /// one held by the object.
    ///
    /// # Safety
    /// `vtbl` must be the slot-0 address of a live vtable.
    pub(crate) unsafe fn clone_from_raw(vtbl: *const *const c_void) -> Self {
        let record = *vtbl.sub(1) as *const VtableRecord;
        Arc::increment_strong_count(record);
        Self {
            record: Arc::from_raw(record),
        }
    }
}

impl std::fmt::Debug for Vtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vtable")
            .field("slots", &self.method_names().collect::<Vec<_>>())
            .field("address", &self.as_ptr())
            .finish()
    }
}

/// Runs the handler bound to `slot` of the object at `this`.
///
/// # Safety
/// `this` must be null or an object built by this crate whose vtable has a
/// slot `slot` declared with `words.len()` arguments.
unsafe fn dispatch(this: *mut c_void, slot: usize, words: &[usize]) -> u32 {
    if this.is_null() {
        return HResult::E_POINTER.as_u32();
    }
    let vtbl = (*(this as *const RawHandle)).vtbl;
    if vtbl.is_null() {
        return HResult::E_POINTER.as_u32();
    }

    // Hold a reference for the duration of the call: the handler may ask for
    // the object to be destroyed.
    let vtable = Vtable::clone_from_raw(vtbl);
    let Some(method) = vtable.record.methods.get(slot) else {
        tracing::error!(slot, "call through a slot the vtable does not have");
        return HResult::E_UNEXPECTED.as_u32();
    };

    let args: Vec<Arg> = method
        .signature
        .args()
        .iter()
        .zip(words)
        .map(|(param, &word)| Arg::decode(param.ty, word))
        .collect();
    let call = Invocation::new(&method.name, this, &args);

    tracing::trace!(method = %method.name, slot, this = ?this, "native call");

    let value = match panic::catch_unwind(AssertUnwindSafe(|| (method.handler)(&call))) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            tracing::debug!(method = %method.name, error = %err, "handler failed");
            method.returns.failure(&err)
        }
        Err(_) => {
            tracing::error!(method = %method.name, "handler panicked");
            method.returns.panicked()
        }
    };

    if call.destroy_requested() {
        tracing::trace!(this = ?this, "destroying object");
        drop(ObjectHandle::from_raw(this));
    }

    value
}

define_thunks!(thunk0, THUNKS_0, ());
define_thunks!(thunk1, THUNKS_1, (a0));
define_thunks!(thunk2, THUNKS_2, (a0, a1));
define_thunks!(thunk3, THUNKS_3, (a0, a1, a2));
define_thunks!(thunk4, THUNKS_4, (a0, a1, a2, a3));
define_thunks!(thunk5, THUNKS_5, (a0, a1, a2, a3, a4));
define_thunks!(thunk6, THUNKS_6, (a0, a1, a2, a3, a4, a5));

/// Returns the trampoline for `slot` with `arity` arguments after `this`.
fn thunk_for(arity: usize, slot: usize) -> Result<*const c_void> {
    let thunk = match arity {
        0 => THUNKS_0.get(slot).map(|f| *f as *const c_void),
        1 => THUNKS_1.get(slot).map(|f| *f as *const c_void),
        2 => THUNKS_2.get(slot).map(|f| *f as *const c_void),
        3 => THUNKS_3.get(slot).map(|f| *f as *const c_void),
        4 => THUNKS_4.get(slot).map(|f| *f as *const c_void),
        5 => THUNKS_5.get(slot).map(|f| *f as *const c_void),
        6 => THUNKS_6.get(slot).map(|f| *f as *const c_void),
        _ => None,
    };
    thunk.ok_or_else(|| {
        Error::Descriptor(format!(
            "no trampoline for slot {slot} with {arity} arguments (limits: {MAX_SLOTS} slots, {MAX_ARITY} arguments)"
        ))
    })
}
