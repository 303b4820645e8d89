//! Provides the declarative description of an interface and the context a
//! handler sees when a native caller invokes one of its slots.
//!
//! # Examples
//! ```
//! use dyncom::descriptor::{InterfaceDescriptor, Method};
//! use dyncom::hresult::HResult;
//!
//! let descriptor = InterfaceDescriptor::new()
//!     .with(Method::new("Ping", "void *This, uint32_t cookie", |call| {
//!         let _cookie = call.u32(0)?;
//!         Ok(HResult::S_OK)
//!     }));
//! assert_eq!(descriptor.len(), 1);
//! assert_eq!(descriptor.methods()[0].name(), "Ping");
//! ```

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::hresult::HResult;
use crate::signature::NativeType;

/// Host callable bound to a slot. Returns the raw 32-bit slot value.
pub type Handler = Arc<dyn Fn(&Invocation<'_>) -> Result<u32> + Send + Sync>;

fn bind<F>(handler: F) -> Handler
where
    F: Fn(&Invocation<'_>) -> Result<u32> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// How a slot's 32-bit return value is interpreted by native callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// An `HRESULT`; failures become the error's status code.
    Status,
    /// A `ULONG` count, as returned by `AddRef`/`Release`; failures become 0.
    Count,
}

impl ReturnKind {
    pub(crate) fn failure(self, err: &Error) -> u32 {
        match self {
            ReturnKind::Status => err.status().as_u32(),
            ReturnKind::Count => 0,
        }
    }

    pub(crate) fn panicked(self) -> u32 {
        match self {
            ReturnKind::Status => HResult::E_FAIL.as_u32(),
            ReturnKind::Count => 0,
        }
    }
}

/// Converts a handler's successful result into the slot's return word.
pub trait IntoNative {
    fn into_native(self) -> u32;
}

impl IntoNative for HResult {
    fn into_native(self) -> u32 {
        self.as_u32()
    }
}

impl IntoNative for u32 {
    fn into_native(self) -> u32 {
        self
    }
}

impl IntoNative for i32 {
    fn into_native(self) -> u32 {
        self as u32
    }
}

impl IntoNative for () {
    fn into_native(self) -> u32 {
        HResult::S_OK.as_u32()
    }
}

/// One slot of an interface: name, C parameter list and handler.
#[derive(Clone)]
pub struct Method {
    name: String,
    signature: String,
    returns: ReturnKind,
    handler: Handler,
}

impl Method {
    /// Declares a slot returning an `HRESULT`.
    ///
    /// The signature is parsed when the vtable is built, so an
    /// unrepresentable one is reported by [`crate::vtable::Vtable::build`].
    pub fn new<F, R>(name: impl Into<String>, signature: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<R> + Send + Sync + 'static,
        R: IntoNative,
    {
        Self::with_return(name, signature, ReturnKind::Status, handler)
    }

    /// Declares a slot returning a reference count.
    pub fn counting<F>(name: impl Into<String>, signature: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<u32> + Send + Sync + 'static,
    {
        Self::with_return(name, signature, ReturnKind::Count, handler)
    }

    fn with_return<F, R>(
        name: impl Into<String>,
        signature: impl Into<String>,
        returns: ReturnKind,
        handler: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<R> + Send + Sync + 'static,
        R: IntoNative,
    {
        Self {
            name: name.into(),
            signature: signature.into(),
            returns,
            handler: bind(move |call| handler(call).map(IntoNative::into_native)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Ordered list of slots describing one interface. Slot order is vtable order.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDescriptor {
    methods: Vec<Method>,
}

impl InterfaceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot.
    pub fn with(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Appends every slot of `methods`, keeping their order.
    pub fn with_all(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn push(&mut self, method: Method) {
        self.methods.push(method);
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub(crate) fn into_methods(self) -> Vec<Method> {
        self.methods
    }
}

impl FromIterator<Method> for InterfaceDescriptor {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        Self {
            methods: iter.into_iter().collect(),
        }
    }
}

/// A decoded native argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Pointer(*mut c_void),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Isize(isize),
    Usize(usize),
}

impl Arg {
    /// Decodes one argument word according to its declared type. Bits above
    /// the declared width are not defined by the calling convention and are
    /// discarded.
    pub(crate) fn decode(ty: NativeType, word: usize) -> Self {
        match ty {
            NativeType::Pointer => Arg::Pointer(word as *mut c_void),
            NativeType::I8 => Arg::I8(word as u8 as i8),
            NativeType::U8 => Arg::U8(word as u8),
            NativeType::I16 => Arg::I16(word as u16 as i16),
            NativeType::U16 => Arg::U16(word as u16),
            NativeType::I32 => Arg::I32(word as u32 as i32),
            NativeType::U32 => Arg::U32(word as u32),
            NativeType::I64 => Arg::I64(word as u64 as i64),
            NativeType::U64 => Arg::U64(word as u64),
            NativeType::Isize => Arg::Isize(word as isize),
            NativeType::Usize => Arg::Usize(word),
        }
    }
}

/// Everything a handler receives for one native call.
pub struct Invocation<'a> {
    method: &'a str,
    this: *mut c_void,
    args: &'a [Arg],
    destroy: Cell<bool>,
}

macro_rules! typed_arg {
    ($(#[$doc:meta])* $fn_name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $fn_name(&self, index: usize) -> Result<$ty> {
            match self.arg(index)? {
                Arg::$variant(value) => Ok(value),
                other => Err(self.mismatch(index, stringify!($variant), other)),
            }
        }
    };
}

impl<'a> Invocation<'a> {
    /// Creates an invocation. Mostly useful for calling handlers directly in
    /// tests; trampolines build their own.
    pub fn new(method: &'a str, this: *mut c_void, args: &'a [Arg]) -> Self {
        Self {
            method,
            this,
            args,
            destroy: Cell::new(false),
        }
    }

    /// Name of the slot being invoked.
    pub fn method(&self) -> &str {
        self.method
    }

    /// The object address the native caller invoked the slot on.
    pub fn this(&self) -> *mut c_void {
        self.this
    }

    /// Arguments after `this`.
    pub fn args(&self) -> &[Arg] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Result<Arg> {
        self.args.get(index).copied().ok_or_else(|| Error::Argument {
            index,
            reason: format!("{} takes {} arguments", self.method, self.args.len()),
        })
    }

    typed_arg!(pointer, Pointer, *mut c_void);
    typed_arg!(i32, I32, i32);
    typed_arg!(u32, U32, u32);
    typed_arg!(i64, I64, i64);
    typed_arg!(u64, U64, u64);
    typed_arg!(usize, Usize, usize);

    /// Reads the GUID behind a `REFIID`-style pointer argument.
    ///
    /// # Errors
    /// [`Error::NullPointer`] if the pointer is null.
    pub fn guid(&self, index: usize) -> Result<Guid> {
        let ptr = self.pointer(index)? as *const Guid;
        if ptr.is_null() {
            return Err(Error::NullPointer("GUID reference"));
        }
        // SAFETY: the native caller passes a readable GUID for REFIID slots.
        Ok(unsafe { ptr.read_unaligned() })
    }

    /// Returns a `void **` out-parameter, checked for null.
    pub fn out_pointer(&self, index: usize) -> Result<*mut *mut c_void> {
        let ptr = self.pointer(index)? as *mut *mut c_void;
        if ptr.is_null() {
            return Err(Error::NullPointer("out pointer"));
        }
        Ok(ptr)
    }

    /// Asks the trampoline to free the object once this call has returned.
    /// Used by `Release` when the count reaches zero.
    pub fn destroy_this(&self) {
        self.destroy.set(true);
    }

    pub(crate) fn destroy_requested(&self) -> bool {
        self.destroy.get()
    }

    fn mismatch(&self, index: usize, expected: &str, found: Arg) -> Error {
        Error::Argument {
            index,
            reason: format!("{} expected {expected}, found {found:?}", self.method),
        }
    }
}
