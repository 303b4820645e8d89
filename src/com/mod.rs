//! Provides the native object layout and the trampoline machinery.
//!
//! # Overview
//!
//! - [`helpers::RawHandle`] - The object layout native callers dereference
//! - [`helpers::MutexExt`] - Panic-free mutex locking
//! - [`helpers::SendPtr`] - Published object addresses in shared tables
//! - `define_thunks!` - Per-arity, per-slot trampoline generation
//!
//! # Examples
//! ```
//! use std::sync::Mutex;
//!
//! use dyncom::com::MutexExt;
//!
//! let mutex = Mutex::new(7u32);
//! let guard = mutex.lock_or_fail().expect("lock should succeed");
//! assert_eq!(*guard, 7);
//! ```

pub mod helpers;

#[macro_use]
mod macros;

pub use helpers::{MutexExt, RawHandle, SendPtr};
