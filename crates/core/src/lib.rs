//! lispc-core: language-agnostic foundation primitives.
//!
//! This crate has no notion of Lisp syntax or bytecode; it provides the two
//! primitives every layer above it is built from:
//!
//! - [`intern`]: deduplicate identifier strings into small integer ids.
//! - [`pool`]: a generational-free-list object store returning stable
//!   [`pool::Handle<T>`] references, with a per-slot mark color for the
//!   garbage collector in `lispc-runtime` to drive.

pub mod intern;
pub mod pool;

pub use intern::{InternedSymbol, Interner};
pub use pool::{Color, Handle, ObjectNotFound, Pool};
