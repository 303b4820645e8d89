//! Registers class factories with an object broker and creates instances
//! through it.
//!
//! The broker is whatever resolves a class identifier to a factory:
//! [`InProcessBroker`] on every platform, [`Ole32Broker`] on Windows. Callers
//! of [`ClassRegistry`] only ever get objects back as [`ComPtr`]s obtained
//! through native vtable calls, never as Rust values.
//!
//! # Examples
//! ```
//! use dyncom::descriptor::Method;
//! use dyncom::factory::ClassFactory;
//! use dyncom::guid::{Guid, IID_IUNKNOWN};
//! use dyncom::object::{ComObject, ObjectBase, ObjectPolicy};
//! use dyncom::registry::{ClassRegistry, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE};
//!
//! let clsid = Guid::from_u128(0x3f2a8f4e_51c1_4b7a_9d11_0c2f9b9e8a01);
//! let factory = ClassFactory::new(clsid, ObjectPolicy::default(), || {
//!     let base = ObjectBase::new("Doc", [], ObjectPolicy::destroy_at_zero());
//!     ComObject::build(base, [Method::new("Poke", "void *This", |_| Ok(()))])
//! });
//!
//! let registry = ClassRegistry::in_process();
//! registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
//! let object = registry.create_instance(&clsid, &IID_IUNKNOWN, CLSCTX_INPROC_SERVER).unwrap();
//! drop(object);
//! registry.revoke(&clsid).unwrap();
//! ```

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::client::ComPtr;
use crate::com::{MutexExt, SendPtr};
use crate::error::{Error, Result};
use crate::factory::{ClassFactory, FactoryState};
use crate::guid::{Guid, IID_ICLASSFACTORY};
use crate::hresult::HResult;

/// `CLSCTX_INPROC_SERVER`.
pub const CLSCTX_INPROC_SERVER: u32 = 0x1;
/// `CLSCTX_LOCAL_SERVER`.
pub const CLSCTX_LOCAL_SERVER: u32 = 0x4;
/// `REGCLS_SINGLEUSE`.
pub const REGCLS_SINGLEUSE: u32 = 0x0;
/// `REGCLS_MULTIPLEUSE`.
pub const REGCLS_MULTIPLEUSE: u32 = 0x1;

/// `IClassFactory::CreateInstance` as called through the vtable.
type CreateInstanceFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, *const Guid, *mut *mut c_void) -> HResult;

/// Resolves class identifiers to registered factory objects.
///
/// `context` and `flags` are the platform's `CLSCTX` and `REGCLS` values and
/// are passed through unchanged.
pub trait ObjectBroker: Send + Sync {
    /// Makes `object` (an `IClassFactory` provider) available under `clsid`.
    /// The broker takes its own reference. Returns a revocation cookie.
    fn register(&self, clsid: &Guid, object: *mut c_void, context: u32, flags: u32) -> Result<u32>;

    /// Withdraws a registration and drops the broker's reference.
    fn revoke(&self, cookie: u32) -> Result<()>;

    /// Creates an instance of `clsid` and returns an owned reference for
    /// `iid`.
    fn create_instance(&self, clsid: &Guid, iid: &Guid, context: u32) -> Result<*mut c_void>;
}

#[derive(Debug)]
struct BrokerEntry {
    clsid: Guid,
    object: SendPtr,
    context: u32,
    flags: u32,
    connected: bool,
}

impl BrokerEntry {
    /// Single-use class objects serve one connection only.
    fn accepts(&self, clsid: &Guid, context: u32) -> bool {
        self.clsid == *clsid
            && self.context & context != 0
            && !(self.flags == REGCLS_SINGLEUSE && self.connected)
    }
}

/// Portable broker that keeps registrations in a process-local table.
#[derive(Debug)]
pub struct InProcessBroker {
    entries: Mutex<HashMap<u32, BrokerEntry>>,
    next_cookie: AtomicU32,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_cookie: AtomicU32::new(1),
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.lock_or_fail().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBroker for InProcessBroker {
    fn register(&self, clsid: &Guid, object: *mut c_void, context: u32, flags: u32) -> Result<u32> {
        // SAFETY: the caller hands over a published object.
        let held = unsafe { ComPtr::from_raw_addref(object) }.ok_or(Error::NullPointer("class object"))?;
        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
        self.entries.lock_or_fail()?.insert(
            cookie,
            BrokerEntry {
                clsid: *clsid,
                object: SendPtr(held.into_raw()),
                context,
                flags,
                connected: false,
            },
        );
        tracing::debug!(clsid = %clsid, cookie, context, flags, "broker registered class object");
        Ok(cookie)
    }

    fn revoke(&self, cookie: u32) -> Result<()> {
        let entry = self
            .entries
            .lock_or_fail()?
            .remove(&cookie)
            .ok_or_else(|| Error::Protocol(format!("unknown registration cookie {cookie}")))?;
        tracing::debug!(clsid = %entry.clsid, cookie, "broker revoked class object");
        // SAFETY: the entry owned the reference taken in `register`.
        drop(unsafe { ComPtr::from_raw(entry.object.0) });
        Ok(())
    }

    fn create_instance(&self, clsid: &Guid, iid: &Guid, context: u32) -> Result<*mut c_void> {
        let object = {
            let mut entries = self.entries.lock_or_fail()?;
            let entry = entries
                .values_mut()
                .find(|entry| entry.accepts(clsid, context))
                .ok_or(Error::ClassNotRegistered(*clsid))?;
            entry.connected = true;
            // SAFETY: the entry keeps the object alive while the lock is held.
            unsafe { ComPtr::from_raw_addref(entry.object.0) }.ok_or(Error::NullPointer("class object"))?
        };

        let factory = object.query_interface(&IID_ICLASSFACTORY)?;
        let mut out = std::ptr::null_mut();
        // SAFETY: slot 3 of IClassFactory is CreateInstance.
        let hr = unsafe {
            let create: CreateInstanceFn = std::mem::transmute(factory.slot(3));
            create(factory.as_ptr(), std::ptr::null_mut(), iid, &mut out)
        };
        hr.ok()?;
        if out.is_null() {
            return Err(Error::NullPointer("CreateInstance result"));
        }
        Ok(out)
    }
}

/// Broker backed by the platform's COM runtime.
#[cfg(windows)]
#[derive(Debug)]
pub struct Ole32Broker {
    _private: (),
}

#[cfg(windows)]
impl Ole32Broker {
    /// Initializes COM on the calling thread with the given `COINIT` value.
    ///
    /// COM is left initialized; uninitializing while objects are alive is
    /// undefined behavior.
    pub fn initialize(apartment: u32) -> Result<Self> {
        use windows::Win32::System::Com::{CoInitializeEx, COINIT};

        // S_FALSE (already initialized) counts as success.
        unsafe { CoInitializeEx(None, COINIT(apartment as i32)) }.ok()?;
        tracing::debug!(apartment, "initialized COM");
        Ok(Self { _private: () })
    }
}

#[cfg(windows)]
impl ObjectBroker for Ole32Broker {
    fn register(&self, clsid: &Guid, object: *mut c_void, context: u32, flags: u32) -> Result<u32> {
        use std::mem::ManuallyDrop;
        use windows::Win32::System::Com::{CoRegisterClassObject, CLSCTX, REGCLS};
        use windows_core::{IUnknown, Interface, GUID};

        if object.is_null() {
            return Err(Error::NullPointer("class object"));
        }
        let guid = GUID::from(*clsid);
        // SAFETY: borrowed for the call; COM takes its own reference.
        let unknown = ManuallyDrop::new(unsafe { IUnknown::from_raw(object) });
        let cookie = unsafe { CoRegisterClassObject(&guid, &*unknown, CLSCTX(context), REGCLS(flags as i32)) }?;
        tracing::debug!(clsid = %clsid, cookie, "CoRegisterClassObject");
        Ok(cookie)
    }

    fn revoke(&self, cookie: u32) -> Result<()> {
        use windows::Win32::System::Com::CoRevokeClassObject;

        unsafe { CoRevokeClassObject(cookie) }?;
        tracing::debug!(cookie, "CoRevokeClassObject");
        Ok(())
    }

    fn create_instance(&self, clsid: &Guid, iid: &Guid, context: u32) -> Result<*mut c_void> {
        use windows::Win32::System::Com::{CoCreateInstance, CLSCTX};
        use windows_core::{IUnknown, Interface, GUID};

        let clsid = GUID::from(*clsid);
        let iid = GUID::from(*iid);
        let unknown: IUnknown = unsafe { CoCreateInstance(&clsid, None::<&IUnknown>, CLSCTX(context)) }?;
        let mut out = std::ptr::null_mut();
        unsafe { unknown.query(&iid, &mut out) }.ok()?;
        Ok(out)
    }
}

struct Registration {
    factory: Arc<ClassFactory>,
    object: SendPtr,
    cookie: u32,
}

/// Tracks which classes this process has registered with a broker.
pub struct ClassRegistry {
    broker: Box<dyn ObjectBroker>,
    entries: Mutex<HashMap<Guid, Registration>>,
}

impl ClassRegistry {
    pub fn new(broker: Box<dyn ObjectBroker>) -> Self {
        Self {
            broker,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A registry over a fresh [`InProcessBroker`].
    pub fn in_process() -> Self {
        Self::new(Box::new(InProcessBroker::new()))
    }

    /// Publishes `factory` and registers it with the broker.
    ///
    /// # Errors
    /// - [`Error::Protocol`] if the class is already registered here or the
    ///   factory was registered before.
    /// - Whatever the broker reports.
    pub fn register(&self, factory: &Arc<ClassFactory>, context: u32, flags: u32) -> Result<u32> {
        let clsid = factory.clsid();
        let mut entries = self.entries.lock_or_fail()?;
        if entries.contains_key(&clsid) {
            return Err(Error::Protocol(format!("class {clsid} is already registered")));
        }
        let state = factory.state()?;
        if state != FactoryState::Unregistered {
            return Err(Error::Protocol(format!("factory for {clsid} is {state:?}")));
        }

        let object = factory.into_object()?.into_raw();
        let cookie = match self.broker.register(&clsid, object, context, flags) {
            Ok(cookie) => cookie,
            Err(err) => {
                // SAFETY: gives back the one reference `into_object` counted for it.
                drop(unsafe { ComPtr::from_raw(object) });
                return Err(err);
            }
        };

        factory.mark_registered()?;
        entries.insert(
            clsid,
            Registration {
                factory: Arc::clone(factory),
                object: SendPtr(object),
                cookie,
            },
        );
        tracing::info!(clsid = %clsid, cookie, context, flags, "registered class");
        Ok(cookie)
    }

    /// Creates an instance of `clsid` through the broker.
    pub fn create_instance(&self, clsid: &Guid, iid: &Guid, context: u32) -> Result<ComPtr> {
        let object = self.broker.create_instance(clsid, iid, context)?;
        // SAFETY: the broker returns an owned reference.
        unsafe { ComPtr::from_raw(object) }.ok_or(Error::NullPointer("created object"))
    }

    /// Returns the registered factory object for `clsid`, negotiated for
    /// `iid`, without going through the broker.
    ///
    /// # Errors
    /// [`Error::ClassNotRegistered`] if `clsid` is not registered here.
    pub fn class_object(&self, clsid: &Guid, iid: &Guid) -> Result<ComPtr> {
        let entries = self.entries.lock_or_fail()?;
        let registration = entries.get(clsid).ok_or(Error::ClassNotRegistered(*clsid))?;
        // SAFETY: the registration holds the publishing reference; borrow it
        // only long enough to negotiate a new one.
        let published = std::mem::ManuallyDrop::new(
            unsafe { ComPtr::from_raw(registration.object.0) }.ok_or(Error::NullPointer("class object"))?,
        );
        published.query_interface(iid)
    }

    /// Withdraws `clsid` from the broker and drops the publishing reference.
    ///
    /// # Errors
    /// [`Error::ClassNotRegistered`] if `clsid` is not registered here.
    pub fn revoke(&self, clsid: &Guid) -> Result<()> {
        let registration = self
            .entries
            .lock_or_fail()?
            .remove(clsid)
            .ok_or(Error::ClassNotRegistered(*clsid))?;
        self.release(registration)?;
        tracing::info!(clsid = %clsid, "revoked class");
        Ok(())
    }

    pub fn is_registered(&self, clsid: &Guid) -> bool {
        self.entries
            .lock_or_fail()
            .map(|entries| entries.contains_key(clsid))
            .unwrap_or(false)
    }

    /// Registered class identifiers, in no particular order.
    pub fn classes(&self) -> Vec<Guid> {
        self.entries
            .lock_or_fail()
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Revokes every registration.
    pub fn revoke_all(&self) -> Result<()> {
        let registrations: Vec<Registration> = self.entries.lock_or_fail()?.drain().map(|(_, r)| r).collect();
        let mut first_error = None;
        for registration in registrations {
            let clsid = registration.factory.clsid();
            if let Err(err) = self.release(registration) {
                tracing::warn!(clsid = %clsid, error = %err, "failed to revoke class");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn release(&self, registration: Registration) -> Result<()> {
        let revoked = self.broker.revoke(registration.cookie);
        // SAFETY: the registration owned the publishing reference.
        drop(unsafe { ComPtr::from_raw(registration.object.0) });
        revoked?;
        registration.factory.mark_revoked()
    }
}

impl Drop for ClassRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.revoke_all() {
            tracing::warn!(error = %err, "registrations left behind");
        }
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes())
            .finish_non_exhaustive()
    }
}

/// The process-wide registry over an [`InProcessBroker`].
pub fn process_registry() -> &'static ClassRegistry {
    static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ClassRegistry::in_process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Method;
    use crate::guid::IID_IUNKNOWN;
    use crate::object::{ComObject, ObjectBase, ObjectPolicy};

    const CLSID_DOC: Guid = Guid::from_u128(0x3f2a8f4e_51c1_4b7a_9d11_0c2f9b9e8a01);
    const IID_DOC: Guid = Guid::from_u128(0x3f2a8f4e_51c1_4b7a_9d11_0c2f9b9e8a02);

    fn doc_factory() -> Arc<ClassFactory> {
        ClassFactory::new(CLSID_DOC, ObjectPolicy::default(), || {
            let base = ObjectBase::new("Doc", [IID_DOC], ObjectPolicy::destroy_at_zero());
            ComObject::build(base, [Method::new("Open", "void *This", |_| Ok(HResult::S_FALSE))])
        })
    }

    #[test]
    fn test_register_create_revoke() {
        let registry = ClassRegistry::in_process();
        let factory = doc_factory();

        registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        assert!(registry.is_registered(&CLSID_DOC));
        assert_eq!(factory.state().unwrap(), FactoryState::Registered);
        // Publishing reference plus the broker's.
        assert_eq!(factory.base().count(), 2);

        let doc = registry.create_instance(&CLSID_DOC, &IID_DOC, CLSCTX_INPROC_SERVER).unwrap();
        assert_eq!(unsafe { doc.call(3) }, HResult::S_FALSE);
        assert_eq!(factory.instances_created(), 1);
        assert_eq!(factory.base().count(), 2);
        drop(doc);

        registry.revoke(&CLSID_DOC).unwrap();
        assert!(!registry.is_registered(&CLSID_DOC));
        assert_eq!(factory.state().unwrap(), FactoryState::Revoked);
        assert_eq!(factory.base().count(), 0);
    }

    #[test]
    fn test_double_registration_rejected() {
        let registry = ClassRegistry::in_process();
        let factory = doc_factory();
        registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        let err = registry.register(&doc_factory(), CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(registry.classes(), vec![CLSID_DOC]);
    }

    #[test]
    fn test_unknown_class_and_context_mismatch() {
        let registry = ClassRegistry::in_process();
        let err = registry.create_instance(&CLSID_DOC, &IID_IUNKNOWN, CLSCTX_INPROC_SERVER).unwrap_err();
        assert!(matches!(err, Error::ClassNotRegistered(clsid) if clsid == CLSID_DOC));

        registry.register(&doc_factory(), CLSCTX_LOCAL_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        let err = registry.create_instance(&CLSID_DOC, &IID_IUNKNOWN, CLSCTX_INPROC_SERVER).unwrap_err();
        assert!(matches!(err, Error::ClassNotRegistered(_)));
        assert!(registry.create_instance(&CLSID_DOC, &IID_IUNKNOWN, CLSCTX_LOCAL_SERVER).is_ok());
    }

    #[test]
    fn test_negotiation_failure_reported_as_status() {
        let registry = ClassRegistry::in_process();
        registry.register(&doc_factory(), CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        let missing = Guid::from_u128(0xdead);
        let err = registry.create_instance(&CLSID_DOC, &missing, CLSCTX_INPROC_SERVER).unwrap_err();
        assert!(matches!(err, Error::Status(HResult::E_NOINTERFACE)));
    }

    #[test]
    fn test_single_use_serves_one_connection() {
        let registry = ClassRegistry::in_process();
        registry.register(&doc_factory(), CLSCTX_INPROC_SERVER, REGCLS_SINGLEUSE).unwrap();
        assert!(registry.create_instance(&CLSID_DOC, &IID_DOC, CLSCTX_INPROC_SERVER).is_ok());
        let err = registry.create_instance(&CLSID_DOC, &IID_DOC, CLSCTX_INPROC_SERVER).unwrap_err();
        assert!(matches!(err, Error::ClassNotRegistered(_)));
        registry.revoke(&CLSID_DOC).unwrap();
    }

    #[test]
    fn test_class_object_lookup() {
        let registry = ClassRegistry::in_process();
        let factory = doc_factory();
        registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();

        let class_factory = registry.class_object(&CLSID_DOC, &IID_ICLASSFACTORY).unwrap();
        assert_eq!(factory.base().count(), 3);
        drop(class_factory);
        assert_eq!(factory.base().count(), 2);

        let err = registry.class_object(&CLSID_DOC, &IID_DOC).unwrap_err();
        assert!(matches!(err, Error::Status(HResult::E_NOINTERFACE)));
        let other = Guid::from_u128(7);
        assert!(matches!(registry.class_object(&other, &IID_IUNKNOWN), Err(Error::ClassNotRegistered(_))));
    }

    #[test]
    fn test_process_registry_is_shared() {
        let clsid = Guid::from_u128(0x3f2a8f4e_51c1_4b7a_9d11_0c2f9b9e8aff);
        let factory = ClassFactory::new(clsid, ObjectPolicy::default(), || {
            ComObject::build(ObjectBase::new("Shared", [], ObjectPolicy::destroy_at_zero()), [])
        });
        assert!(std::ptr::eq(process_registry(), process_registry()));

        process_registry().register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        assert!(process_registry().is_registered(&clsid));
        drop(process_registry().create_instance(&clsid, &IID_IUNKNOWN, CLSCTX_INPROC_SERVER).unwrap());
        process_registry().revoke(&clsid).unwrap();
        assert!(!process_registry().is_registered(&clsid));
    }

    #[test]
    fn test_revoke_unknown_class() {
        let registry = ClassRegistry::in_process();
        assert!(matches!(registry.revoke(&CLSID_DOC), Err(Error::ClassNotRegistered(_))));
    }

    #[test]
    fn test_drop_revokes_remaining() {
        let factory = doc_factory();
        {
            let registry = ClassRegistry::in_process();
            registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        }
        assert_eq!(factory.state().unwrap(), FactoryState::Revoked);
        assert_eq!(factory.base().count(), 0);
    }

    /// Refuses the first registration, then defers to an in-process broker.
    struct FailOnce {
        failed: std::sync::atomic::AtomicBool,
        inner: InProcessBroker,
    }

    impl ObjectBroker for FailOnce {
        fn register(&self, clsid: &Guid, object: *mut c_void, context: u32, flags: u32) -> Result<u32> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(Error::Status(HResult::E_UNEXPECTED));
            }
            self.inner.register(clsid, object, context, flags)
        }

        fn revoke(&self, cookie: u32) -> Result<()> {
            self.inner.revoke(cookie)
        }

        fn create_instance(&self, clsid: &Guid, iid: &Guid, context: u32) -> Result<*mut c_void> {
            self.inner.create_instance(clsid, iid, context)
        }
    }

    #[test]
    fn test_register_retry_after_broker_failure() {
        let registry = ClassRegistry::new(Box::new(FailOnce {
            failed: std::sync::atomic::AtomicBool::new(false),
            inner: InProcessBroker::new(),
        }));
        let factory = ClassFactory::new(CLSID_DOC, ObjectPolicy::destroy_at_zero(), || {
            let base = ObjectBase::new("Doc", [IID_DOC], ObjectPolicy::destroy_at_zero());
            ComObject::build(base, [Method::new("Open", "void *This", |_| Ok(HResult::S_FALSE))])
        });

        let err = registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap_err();
        assert!(matches!(err, Error::Status(HResult::E_UNEXPECTED)));
        assert_eq!(factory.state().unwrap(), FactoryState::Unregistered);
        assert_eq!(factory.base().count(), 0);

        registry.register(&factory, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        // Publishing reference plus the broker's.
        assert_eq!(factory.base().count(), 2);

        let doc = registry.create_instance(&CLSID_DOC, &IID_DOC, CLSCTX_INPROC_SERVER).unwrap();
        assert_eq!(unsafe { doc.call(3) }, HResult::S_FALSE);
        drop(doc);

        registry.revoke(&CLSID_DOC).unwrap();
        assert_eq!(factory.state().unwrap(), FactoryState::Revoked);
        assert_eq!(factory.base().count(), 0);
    }

    #[test]
    fn test_broker_reference_counting() {
        let broker = InProcessBroker::new();
        let factory = doc_factory();
        let object = factory.into_object().unwrap().into_raw();

        let cookie = broker.register(&CLSID_DOC, object, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE).unwrap();
        assert_eq!(broker.len(), 1);
        assert_eq!(factory.base().count(), 2);
        broker.revoke(cookie).unwrap();
        assert!(broker.is_empty());
        assert_eq!(factory.base().count(), 1);
        assert!(matches!(broker.revoke(cookie), Err(Error::Protocol(_))));
        assert!(matches!(
            broker.register(&CLSID_DOC, std::ptr::null_mut(), CLSCTX_INPROC_SERVER, 0),
            Err(Error::NullPointer(_))
        ));

        drop(unsafe { ComPtr::from_raw(object) });
        drop(unsafe { crate::handle::ObjectHandle::from_raw(object) });
    }
}
