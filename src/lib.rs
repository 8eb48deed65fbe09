//! Heritage is a class-based object system for embedding in a host scripting runtime.
//!
//! Classes support multiple inheritance, public, protected and private members, virtual dispatch
//! across the class hierarchy, options, and delegation of methods and options to components.
//! Everything hangs off an [`Engine`], which also carries the small host runtime the object
//! system lives in: values, namespaces, commands and call frames.
//!
//! # Examples
//! ```
//! use heritage::{ArgSpec, Engine, Protection};
//!
//! let mut engine = Engine::new();
//! engine
//!     .build_class("Greeter")?
//!     .variable(Protection::Public, "name", Some("world"))?
//!     .method(Protection::Public, "greet", ArgSpec::new(), |engine, _| {
//!         Ok(format!("Hello, {}!", engine.var("name")?).into())
//!     })?;
//!
//! engine.call(["Greeter", "greeter", "-name", "Heritage"])?;
//! assert_eq!(engine.call(["greeter", "greet"])?.to_string(), "Hello, Heritage!");
//! # Ok::<(), heritage::Error>(())
//! ```

pub mod ll;

mod hl;

pub use hl::*;
pub use ll::value::Value;
