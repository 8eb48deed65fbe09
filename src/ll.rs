//! The **l**ow-**l**evel (`ll`) host runtime the object system is built on.
//!
//! You usually want to use the [high-level API][crate] instead. These are the primitives the
//! object system consumes: values, storage with deferred freeing, namespaces and commands.

pub mod arena;
pub mod glob;
pub mod namespace;
pub mod value;
