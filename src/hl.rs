//! The object system: classes, objects, dispatch and configuration.

mod builtins;
mod class;
mod definition;
mod dispatch;
mod engine;
mod error;
mod heritage;
mod members;
mod object;
mod options;
mod registry;
mod symbols;
mod vtable;

pub use builtins::*;
pub use class::*;
pub use definition::*;
pub use dispatch::*;
pub use engine::*;
pub use error::*;
pub use heritage::*;
pub use members::*;
pub use object::*;
