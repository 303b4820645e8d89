//! Implements the shared `IUnknown` behavior: reference counting and
//! interface negotiation.
//!
//! # Examples
//! ```
//! use dyncom::guid::{Guid, IID_IUNKNOWN};
//! use dyncom::object::{ObjectBase, ObjectPolicy};
//!
//! let iid = Guid::from_u128(0x6531d857_c22f_4add_b2d5_e9785e39fc46);
//! let base = ObjectBase::new("Hello", [iid], ObjectPolicy::default());
//! assert!(base.supports(&IID_IUNKNOWN));
//! assert_eq!(base.add_ref(), 2);
//! assert_eq!(base.release().unwrap(), 1);
//! ```

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{InterfaceDescriptor, Method};
use crate::error::{Error, Result};
use crate::guid::{Guid, IID_IUNKNOWN};
use crate::handle::ObjectHandle;
use crate::hresult::HResult;
use crate::vtable::Vtable;

/// What happens when the reference count reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// The object lives until the process exits.
    #[default]
    Process,
    /// The object and its vtable are freed when the count reaches zero.
    DestroyAtZero,
}

/// What `Release` does when the count is already zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverRelease {
    /// Report [`Error::Protocol`]; the count stays at zero.
    #[default]
    Trap,
    /// Log a warning and stay at zero.
    Saturate,
}

/// Lifetime rules for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPolicy {
    pub lifetime: Lifetime,
    pub over_release: OverRelease,
}

impl ObjectPolicy {
    /// Objects freed at zero, trapping over-release.
    pub fn destroy_at_zero() -> Self {
        Self {
            lifetime: Lifetime::DestroyAtZero,
            over_release: OverRelease::Trap,
        }
    }
}

/// Reference count and supported interfaces of one logical object.
///
/// The count starts at 1, the creator's reference.
pub struct ObjectBase {
    name: String,
    refs: AtomicU32,
    interfaces: Vec<Guid>,
    policy: ObjectPolicy,
}

impl ObjectBase {
    /// Creates a base recognizing `interfaces` plus `IID_IUNKNOWN`.
    pub fn new(
        name: impl Into<String>,
        interfaces: impl IntoIterator<Item = Guid>,
        policy: ObjectPolicy,
    ) -> Arc<Self> {
        let mut set = vec![IID_IUNKNOWN];
        for iid in interfaces {
            if !set.contains(&iid) {
                set.push(iid);
            }
        }
        Arc::new(Self {
            name: name.into(),
            refs: AtomicU32::new(1),
            interfaces: set,
            policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ObjectPolicy {
        self.policy
    }

    /// Interfaces recognized by [`ObjectBase::query_interface`].
    pub fn interfaces(&self) -> &[Guid] {
        &self.interfaces
    }

    /// Current reference count.
    pub fn count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn supports(&self, iid: &Guid) -> bool {
        self.interfaces.contains(iid)
    }

    /// Increments the count and returns the new value.
    pub fn add_ref(&self) -> u32 {
        let count = self.refs.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        tracing::trace!(object = %self.name, count, "AddRef");
        count
    }

    /// Decrements the count and returns the new value.
    ///
    /// # Errors
    /// [`Error::Protocol`] when the count is already zero and the policy is
    /// [`OverRelease::Trap`].
    pub fn release(&self) -> Result<u32> {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
        {
            Ok(previous) => {
                let count = previous - 1;
                tracing::trace!(object = %self.name, count, "Release");
                Ok(count)
            }
            Err(_) => match self.policy.over_release {
                OverRelease::Trap => {
                    tracing::error!(object = %self.name, "Release called with a zero reference count");
                    Err(Error::Protocol(format!("{} released more often than acquired", self.name)))
                }
                OverRelease::Saturate => {
                    tracing::warn!(object = %self.name, "Release called with a zero reference count");
                    Ok(0)
                }
            },
        }
    }

    /// Whether an object at `count` should be freed now.
    pub fn should_destroy(&self, count: u32) -> bool {
        count == 0 && self.policy.lifetime == Lifetime::DestroyAtZero
    }

    /// Negotiates `iid` for the object at `this`.
    ///
    /// On a match the count is incremented and `this` is returned; the same
    /// address serves every interface of the object.
    ///
    /// # Errors
    /// [`Error::InterfaceNotSupported`] with no count change.
    pub fn query_interface(&self, this: *mut c_void, iid: &Guid) -> Result<*mut c_void> {
        if !self.supports(iid) {
            tracing::trace!(object = %self.name, iid = %iid, "QueryInterface miss");
            return Err(Error::InterfaceNotSupported(*iid));
        }
        self.add_ref();
        tracing::trace!(object = %self.name, iid = %iid, "QueryInterface");
        Ok(this)
    }

    /// Releases a reference held on the published object at `this` and frees
    /// the object if the policy says so.
    ///
    /// # Safety
    /// `this` must be the published handle of the object this base belongs
    /// to, and no slot of it may be executing on this thread.
    pub unsafe fn release_raw(&self, this: *mut c_void) -> Result<u32> {
        let count = self.release()?;
        if self.should_destroy(count) {
            tracing::trace!(object = %self.name, "destroying object");
            drop(ObjectHandle::from_raw(this));
        }
        Ok(count)
    }
}

impl fmt::Debug for ObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBase")
            .field("name", &self.name)
            .field("count", &self.count())
            .field("interfaces", &self.interfaces)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Returns the `QueryInterface`, `AddRef` and `Release` slots bound to `base`.
pub fn unknown_methods(base: &Arc<ObjectBase>) -> [Method; 3] {
    let qi = Arc::clone(base);
    let add_ref = Arc::clone(base);
    let release = Arc::clone(base);
    [
        Method::new(
            "QueryInterface",
            "void *This, REFIID riid, void **ppvObject",
            move |call| {
                let out = call.out_pointer(1)?;
                // SAFETY: checked non-null; the caller provides a writable slot.
                unsafe { *out = std::ptr::null_mut() };
                let iid = call.guid(0)?;
                let object = qi.query_interface(call.this(), &iid)?;
                unsafe { *out = object };
                Ok(HResult::S_OK)
            },
        ),
        Method::counting("AddRef", "void *This", move |_| Ok(add_ref.add_ref())),
        Method::counting("Release", "void *This", move |call| {
            let count = release.release()?;
            if release.should_destroy(count) {
                call.destroy_this();
            }
            Ok(count)
        }),
    ]
}

/// An object assembled from a base and its custom slots, not yet published.
pub struct ComObject {
    base: Arc<ObjectBase>,
    handle: ObjectHandle,
}

impl ComObject {
    /// Builds an object whose vtable is the `IUnknown` prefix bound to
    /// `base`, followed by `methods` in order.
    ///
    /// # Errors
    /// Whatever [`Vtable::build`] reports for the descriptor.
    ///
    /// # Examples
    /// ```
    /// use dyncom::descriptor::Method;
    /// use dyncom::object::{ComObject, ObjectBase, ObjectPolicy};
    ///
    /// let base = ObjectBase::new("Empty", [], ObjectPolicy::default());
    /// let object = ComObject::build(base, [Method::new("Noop", "void *This", |_| Ok(()))]).unwrap();
    /// assert_eq!(object.vtable().len(), 4);
    /// ```
    pub fn build(base: Arc<ObjectBase>, methods: impl IntoIterator<Item = Method>) -> Result<Self> {
        let descriptor = InterfaceDescriptor::new()
            .with_all(unknown_methods(&base))
            .with_all(methods);
        let handle = ObjectHandle::wrap(Vtable::build(descriptor)?);
        Ok(Self { base, handle })
    }

    pub fn base(&self) -> &Arc<ObjectBase> {
        &self.base
    }

    pub fn vtable(&self) -> Vtable {
        self.handle.vtable()
    }

    /// The address [`ComObject::into_raw`] will publish.
    ///
    /// Nothing may call through it before publication: a `Release` reaching
    /// zero under [`Lifetime::DestroyAtZero`] would free the handle this
    /// value still owns.
    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Publishes the object; from here on the reference count governs its
    /// lifetime.
    pub fn into_raw(self) -> *mut c_void {
        self.handle.into_raw()
    }
}

impl fmt::Debug for ComObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComObject")
            .field("base", &self.base)
            .field("this", &self.handle.as_ptr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ComPtr;
    use std::sync::atomic::AtomicBool;

    const IID_TEST: Guid = Guid::from_u128(0x11111111_2222_3333_4444_555555555555);
    const IID_OTHER: Guid = Guid::from_u128(0x99999999_8888_7777_6666_555555555555);

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn flagged_object(policy: ObjectPolicy, dropped: &Arc<AtomicBool>) -> ComObject {
        let flag = DropFlag(Arc::clone(dropped));
        let base = ObjectBase::new("Flagged", [IID_TEST], policy);
        ComObject::build(
            base,
            [Method::new("Touch", "void *This", move |_| {
                let _ = &flag;
                Ok(())
            })],
        )
        .unwrap()
    }

    #[test]
    fn test_add_ref_release_pair_is_neutral() {
        let base = ObjectBase::new("Pair", [], ObjectPolicy::default());
        let before = base.count();
        assert_eq!(base.add_ref(), before + 1);
        assert_eq!(base.release().unwrap(), before);
        assert_eq!(base.count(), before);
    }

    #[test]
    fn test_query_unknown_always_succeeds() {
        let base = ObjectBase::new("Q", [IID_TEST], ObjectPolicy::default());
        let this = 0x1000 as *mut c_void;
        let before = base.count();
        assert_eq!(base.query_interface(this, &IID_IUNKNOWN).unwrap(), this);
        assert_eq!(base.count(), before + 1);
        assert_eq!(base.query_interface(this, &IID_TEST).unwrap(), this);
        assert_eq!(base.count(), before + 2);
    }

    #[test]
    fn test_query_miss_leaves_count() {
        let base = ObjectBase::new("Q", [IID_TEST], ObjectPolicy::default());
        let before = base.count();
        let err = base.query_interface(0x1000 as *mut c_void, &IID_OTHER).unwrap_err();
        assert!(matches!(err, Error::InterfaceNotSupported(iid) if iid == IID_OTHER));
        assert_eq!(base.count(), before);
    }

    #[test]
    fn test_over_release_trap() {
        let base = ObjectBase::new("Trap", [], ObjectPolicy::default());
        assert_eq!(base.release().unwrap(), 0);
        assert!(matches!(base.release(), Err(Error::Protocol(_))));
        assert_eq!(base.count(), 0);
    }

    #[test]
    fn test_over_release_saturate() {
        let policy = ObjectPolicy {
            over_release: OverRelease::Saturate,
            ..ObjectPolicy::default()
        };
        let base = ObjectBase::new("Saturate", [], policy);
        assert_eq!(base.release().unwrap(), 0);
        assert_eq!(base.release().unwrap(), 0);
        assert_eq!(base.add_ref(), 1);
    }

    #[test]
    fn test_interface_set_deduplicates_unknown() {
        let base = ObjectBase::new("Set", [IID_IUNKNOWN, IID_TEST, IID_TEST], ObjectPolicy::default());
        assert_eq!(base.interfaces(), &[IID_IUNKNOWN, IID_TEST]);
    }

    #[test]
    fn test_concurrent_counting() {
        let base = ObjectBase::new("Threads", [], ObjectPolicy::default());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let base = Arc::clone(&base);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        base.add_ref();
                        base.release().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(base.count(), 1);
    }

    #[test]
    fn test_vtable_query_interface_through_native_slots() {
        let dropped = Arc::new(AtomicBool::new(false));
        let object = flagged_object(ObjectPolicy::default(), &dropped);
        let base = Arc::clone(object.base());
        let this = object.into_raw();

        let ptr = unsafe { ComPtr::from_raw(this) }.unwrap();
        let again = ptr.query_interface(&IID_TEST).unwrap();
        assert_eq!(again.as_ptr(), this);
        assert_eq!(base.count(), 2);

        assert!(matches!(
            ptr.query_interface(&IID_OTHER),
            Err(Error::Status(HResult::E_NOINTERFACE))
        ));
        assert_eq!(base.count(), 2);

        drop(again);
        drop(ptr);
        assert_eq!(base.count(), 0);
        // Process lifetime: still allocated, reclaim by hand.
        assert!(!dropped.load(Ordering::SeqCst));
        drop(unsafe { ObjectHandle::from_raw(this) });
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_destroy_at_zero_through_release_slot() {
        let dropped = Arc::new(AtomicBool::new(false));
        let object = flagged_object(ObjectPolicy::destroy_at_zero(), &dropped);
        let base = Arc::clone(object.base());
        let this = object.into_raw();

        let ptr = unsafe { ComPtr::from_raw_addref(this) }.unwrap();
        assert_eq!(base.count(), 2);
        unsafe { base.release_raw(this) }.unwrap();
        assert!(!dropped.load(Ordering::SeqCst));

        drop(ptr);
        assert_eq!(base.count(), 0);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_raw_destroys_at_zero() {
        let dropped = Arc::new(AtomicBool::new(false));
        let object = flagged_object(ObjectPolicy::destroy_at_zero(), &dropped);
        let base = Arc::clone(object.base());
        let this = object.into_raw();

        assert_eq!(unsafe { base.release_raw(this) }.unwrap(), 0);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unpublished_object_is_not_touched() {
        let dropped = Arc::new(AtomicBool::new(false));
        let object = flagged_object(ObjectPolicy::destroy_at_zero(), &dropped);
        let base = Arc::clone(object.base());

        // Building counts nothing beyond the initial reference and an unpublished
        // object is freed by its own drop, exactly once.
        assert_eq!(base.count(), 1);
        drop(object);
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(base.count(), 1);

        let dropped = Arc::new(AtomicBool::new(false));
        let object = flagged_object(ObjectPolicy::destroy_at_zero(), &dropped);
        let address = object.as_ptr();
        assert_eq!(object.into_raw(), address);
        assert_ne!(address, std::ptr::null_mut());
        drop(unsafe { ComPtr::from_raw(address) });
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_policy_from_json() {
        let policy: ObjectPolicy =
            serde_json::from_str(r#"{"lifetime": "destroy_at_zero", "over_release": "saturate"}"#).unwrap();
        assert_eq!(policy.lifetime, Lifetime::DestroyAtZero);
        assert_eq!(policy.over_release, OverRelease::Saturate);

        let defaults: ObjectPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, ObjectPolicy::default());
    }
}
