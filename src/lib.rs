//! Provides COM-compatible objects whose vtables are assembled at run time
//! from ordered lists of Rust callables.
//!
//! An interface is described as a list of `(name, C parameter list, handler)`
//! entries. The crate builds a native vtable for it, wraps the vtable in an
//! object whose first word points at slot 0, and hands that object to native
//! code as an ordinary interface pointer. Native callers invoke slots through
//! the vtable; each call lands in the bound handler with its arguments
//! decoded. Class factories and a broker registry let objects be created by
//! class identifier, either in-process or through `ole32` on Windows.
//!
//! # Build
//! ```text
//! cargo build --release
//! ```
//!
//! # Examples
//! ```
//! use dyncom::client::ComPtr;
//! use dyncom::descriptor::Method;
//! use dyncom::guid::Guid;
//! use dyncom::hresult::HResult;
//! use dyncom::object::{ComObject, ObjectBase, ObjectPolicy};
//!
//! let iid = Guid::parse("{6531D857-C22F-4ADD-B2D5-E9785E39FC46}").unwrap();
//! let base = ObjectBase::new("Hello", [iid], ObjectPolicy::destroy_at_zero());
//! let object = ComObject::build(base, [Method::new("Hello", "void *This", |_| Ok(HResult::S_OK))]).unwrap();
//!
//! let ptr = unsafe { ComPtr::from_raw(object.into_raw()) }.unwrap();
//! let hello = ptr.query_interface(&iid).unwrap();
//! assert_eq!(unsafe { hello.call(3) }, HResult::S_OK);
//! ```

// Must be declared first for macro availability
#[macro_use]
pub mod com;

pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod guid;
pub mod handle;
pub mod hello;
pub mod hresult;
pub mod object;
pub mod registry;
pub mod signature;
pub mod vtable;

pub use client::ComPtr;
pub use config::ServerConfig;
pub use descriptor::{InterfaceDescriptor, Invocation, Method};
pub use error::{Error, Result};
pub use factory::ClassFactory;
pub use guid::Guid;
pub use hresult::HResult;
pub use object::{ComObject, ObjectBase, ObjectPolicy};
pub use registry::{ClassRegistry, ObjectBroker};
pub use vtable::Vtable;
