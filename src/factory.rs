//! Implements `IClassFactory` for classes whose objects are built at runtime.
//!
//! # Examples
//! ```
//! use dyncom::descriptor::Method;
//! use dyncom::factory::ClassFactory;
//! use dyncom::guid::{Guid, IID_IUNKNOWN};
//! use dyncom::object::{ComObject, ObjectBase, ObjectPolicy};
//!
//! let clsid = Guid::from_u128(0xd6d16ab8_f65f_4152_8cf6_4f5e00e8aaa7);
//! let factory = ClassFactory::new(clsid, ObjectPolicy::default(), || {
//!     let base = ObjectBase::new("Thing", [], ObjectPolicy::destroy_at_zero());
//!     ComObject::build(base, [Method::new("Poke", "void *This", |_| Ok(()))])
//! });
//!
//! let object = factory.create_instance(std::ptr::null_mut(), &IID_IUNKNOWN).unwrap();
//! assert!(!object.is_null());
//! assert_eq!(factory.instances_created(), 1);
//! # unsafe { dyncom::client::ComPtr::from_raw(object) };
//! ```

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::com::MutexExt;
use crate::descriptor::Method;
use crate::error::{Error, Result};
use crate::guid::{Guid, IID_ICLASSFACTORY};
use crate::hresult::HResult;
use crate::object::{ComObject, ObjectBase, ObjectPolicy};

/// Builds one fresh object per `CreateInstance` call.
pub type Constructor = Arc<dyn Fn() -> Result<ComObject> + Send + Sync>;

/// Registration lifecycle of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    Unregistered,
    Registered,
    Revoked,
}

/// Produces instances of one class.
pub struct ClassFactory {
    clsid: Guid,
    base: Arc<ObjectBase>,
    constructor: Constructor,
    state: Mutex<FactoryState>,
    created: AtomicU64,
    initial_ref_taken: AtomicBool,
}

impl ClassFactory {
    /// Creates a factory for `clsid`. `policy` governs the factory object
    /// itself; instances carry whatever policy `constructor` gives them.
    pub fn new<F>(clsid: Guid, policy: ObjectPolicy, constructor: F) -> Arc<Self>
    where
        F: Fn() -> Result<ComObject> + Send + Sync + 'static,
    {
        Arc::new(Self {
            clsid,
            base: ObjectBase::new(format!("ClassFactory({clsid})"), [IID_ICLASSFACTORY], policy),
            constructor: Arc::new(constructor),
            state: Mutex::new(FactoryState::Unregistered),
            created: AtomicU64::new(0),
            initial_ref_taken: AtomicBool::new(false),
        })
    }

    pub fn clsid(&self) -> Guid {
        self.clsid
    }

    /// Reference count and interface set of the factory object.
    pub fn base(&self) -> &Arc<ObjectBase> {
        &self.base
    }

    /// Number of instances constructed so far.
    pub fn instances_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Constructs an instance and negotiates `iid` on it.
    ///
    /// The constructor's reference is released whether or not negotiation
    /// succeeds; on success the caller owns exactly the reference taken by
    /// the negotiation.
    ///
    /// # Errors
    /// - [`Error::NotImplemented`] if `outer` is non-null; nothing is built.
    /// - [`Error::InterfaceNotSupported`] if the instance lacks `iid`.
    /// - Whatever the constructor reports.
    pub fn create_instance(&self, outer: *mut c_void, iid: &Guid) -> Result<*mut c_void> {
        if !outer.is_null() {
            tracing::debug!(clsid = %self.clsid, "aggregation requested");
            return Err(Error::NotImplemented("aggregation"));
        }

        let object = (self.constructor)()?;
        let base = Arc::clone(object.base());
        let this = object.into_raw();
        self.created.fetch_add(1, Ordering::Relaxed);

        let negotiated = base.query_interface(this, iid);
        // SAFETY: `this` was just published and holds the constructor's
        // reference, which is given up here.
        let released = unsafe { base.release_raw(this) };
        let object = negotiated?;
        released?;

        tracing::debug!(clsid = %self.clsid, iid = %iid, object = %base.name(), "created instance");
        Ok(object)
    }

    /// Server lock counting is not supported.
    pub fn lock_server(&self, lock: bool) -> Result<()> {
        tracing::debug!(clsid = %self.clsid, lock, "LockServer");
        Err(Error::NotImplemented("LockServer"))
    }

    pub fn state(&self) -> Result<FactoryState> {
        Ok(*self.state.lock_or_fail()?)
    }

    /// Moves `Unregistered -> Registered`.
    pub fn mark_registered(&self) -> Result<()> {
        self.transition(FactoryState::Unregistered, FactoryState::Registered)
    }

    /// Moves `Registered -> Revoked`.
    pub fn mark_revoked(&self) -> Result<()> {
        self.transition(FactoryState::Registered, FactoryState::Revoked)
    }

    fn transition(&self, from: FactoryState, to: FactoryState) -> Result<()> {
        let mut state = self.state.lock_or_fail()?;
        if *state != from {
            return Err(Error::Protocol(format!(
                "factory for {} is {:?}, cannot become {to:?}",
                self.clsid, *state
            )));
        }
        *state = to;
        Ok(())
    }

    /// Builds the factory's own native object: the `IUnknown` slots followed
    /// by `CreateInstance` and `LockServer`.
    ///
    /// Every object built here shares this factory's reference count and
    /// carries one reference on it: the first takes the count's initial
    /// reference, later ones add their own. Releasing a returned object once
    /// gives back exactly that reference.
    pub fn into_object(self: &Arc<Self>) -> Result<ComObject> {
        let create = Arc::clone(self);
        let lock = Arc::clone(self);
        let object = ComObject::build(
            Arc::clone(&self.base),
            [
                Method::new(
                    "CreateInstance",
                    "void *This, IUnknown *pUnkOuter, REFIID riid, void **ppvObject",
                    move |call| {
                        let out = call.out_pointer(2)?;
                        // SAFETY: checked non-null; the caller provides a writable slot.
                        unsafe { *out = std::ptr::null_mut() };
                        let outer = call.pointer(0)?;
                        let iid = call.guid(1)?;
                        let object = create.create_instance(outer, &iid)?;
                        unsafe { *out = object };
                        Ok(HResult::S_OK)
                    },
                ),
                Method::new("LockServer", "void *This, BOOL fLock", move |call| {
                    lock.lock_server(call.i32(0)? != 0)
                }),
            ],
        )?;
        if self.initial_ref_taken.swap(true, Ordering::AcqRel) {
            self.base.add_ref();
        }
        Ok(object)
    }
}

impl fmt::Debug for ClassFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFactory")
            .field("clsid", &self.clsid)
            .field("base", &self.base)
            .field("state", &self.state)
            .field("created", &self.instances_created())
            .finish_non_exhaustive()
    }
}
