//! The demonstration class: one custom method, `Hello`, that prints a
//! greeting.
//!
//! # Examples
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use dyncom::hello::{hello_factory, Greeter, HelloClient, CLSID_HELLO, IID_HELLO};
//! use dyncom::object::ObjectPolicy;
//! use dyncom::registry::{ClassRegistry, CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE};
//!
//! let lines = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&lines);
//! let greeter = Greeter::new("HELLO, WORLD!!", move |line| sink.lock().unwrap().push(line.to_string()));
//!
//! let registry = ClassRegistry::in_process();
//! registry
//!     .register(&hello_factory(greeter, ObjectPolicy::destroy_at_zero()), CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE)
//!     .unwrap();
//!
//! let object = registry.create_instance(&CLSID_HELLO, &IID_HELLO, CLSCTX_INPROC_SERVER).unwrap();
//! HelloClient::query(&object).unwrap().hello().unwrap();
//! assert_eq!(*lines.lock().unwrap(), vec!["HELLO, WORLD!!".to_string()]);
//! ```

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::client::ComPtr;
use crate::descriptor::Method;
use crate::error::Result;
use crate::factory::ClassFactory;
use crate::guid::Guid;
use crate::hresult::HResult;
use crate::object::{ComObject, ObjectBase, ObjectPolicy};

// {D6D16AB8-F65F-4152-8CF6-4F5E00E8AAA7}
pub const CLSID_HELLO: Guid = Guid::from_u128(0xd6d16ab8_f65f_4152_8cf6_4f5e00e8aaa7);
// {6531D857-C22F-4ADD-B2D5-E9785E39FC46}
pub const IID_HELLO: Guid = Guid::from_u128(0x6531d857_c22f_4add_b2d5_e9785e39fc46);

/// Vtable slot of `Hello`, right after the `IUnknown` prefix.
pub const HELLO_SLOT: usize = 3;

pub const HELLO_MESSAGE: &str = "HELLO, WORLD!!";

/// Receives each greeting line.
pub type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared state behind every `Hello` instance.
pub struct Greeter {
    message: String,
    sink: Sink,
    greetings: AtomicU64,
}

impl Greeter {
    pub fn new<F>(message: impl Into<String>, sink: F) -> Arc<Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Arc::new(Self {
            message: message.into(),
            sink: Arc::new(sink),
            greetings: AtomicU64::new(0),
        })
    }

    /// Greets on standard output.
    pub fn stdout() -> Arc<Self> {
        Self::new(HELLO_MESSAGE, |line| {
            let mut out = std::io::stdout().lock();
            if let Err(err) = writeln!(out, "{line}") {
                tracing::warn!(error = %err, "failed to write greeting");
            }
        })
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Emits the message once.
    pub fn greet(&self) -> HResult {
        (self.sink)(&self.message);
        let count = self.greetings.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(count, "Hello");
        HResult::S_OK
    }

    /// Number of greetings emitted so far.
    pub fn greetings(&self) -> u64 {
        self.greetings.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Greeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Greeter")
            .field("message", &self.message)
            .field("greetings", &self.greetings())
            .finish_non_exhaustive()
    }
}

/// Builds one `Hello` instance.
pub fn hello_object(greeter: &Arc<Greeter>, policy: ObjectPolicy) -> Result<ComObject> {
    let greeter = Arc::clone(greeter);
    let base = ObjectBase::new("Hello", [IID_HELLO], policy);
    ComObject::build(base, [Method::new("Hello", "void *This", move |_| Ok(greeter.greet()))])
}

/// Factory for [`CLSID_HELLO`] whose instances use `instances` as their
/// lifetime policy.
pub fn hello_factory(greeter: Arc<Greeter>, instances: ObjectPolicy) -> Arc<ClassFactory> {
    hello_factory_with_policies(greeter, ObjectPolicy::default(), instances)
}

pub fn hello_factory_with_policies(
    greeter: Arc<Greeter>,
    factory: ObjectPolicy,
    instances: ObjectPolicy,
) -> Arc<ClassFactory> {
    ClassFactory::new(CLSID_HELLO, factory, move || hello_object(&greeter, instances))
}

/// A reference known to expose [`IID_HELLO`].
#[derive(Debug, Clone)]
pub struct HelloClient {
    ptr: ComPtr,
}

impl HelloClient {
    /// Negotiates [`IID_HELLO`] on `object`.
    pub fn query(object: &ComPtr) -> Result<Self> {
        Ok(Self {
            ptr: object.query_interface(&IID_HELLO)?,
        })
    }

    pub fn as_ptr(&self) -> &ComPtr {
        &self.ptr
    }

    /// Calls `Hello` through the vtable.
    pub fn hello(&self) -> Result<()> {
        // SAFETY: the pointer was negotiated for IID_HELLO, whose slot 3 is
        // `HRESULT Hello(void *This)`.
        unsafe { self.ptr.call(HELLO_SLOT) }.ok()
    }
}
