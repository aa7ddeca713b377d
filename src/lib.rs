//! # Container Bridge - DI Container Interoperability for Rust
//!
//! An interoperability bridge that lets two distinct dependency-injection
//! containers cooperate inside one application: a convention-driven **source
//! container** built from prioritized definition sources, and a declarative
//! **target container** holding service definitions, aliases and parameters.
//!
//! ## Features
//!
//! - 🔀 **One resolution path** - every source entry is re-declared in the
//!   target container, so a single lookup surface serves both worlds
//! - 🧭 **Declaration dispatch** - objects, factories, references,
//!   environment variables, strings, values and nested arrays each translate
//!   to the right target registration
//! - 🔍 **Return-type inference** - factory callables report their declared
//!   return type, giving the target container a concrete class name without
//!   running the factory
//! - 📋 **Priority ordering** - definition sources load by descending
//!   priority, stable within a priority group
//! - 🏭 **Lazy runtime resolver** - the bridge builds its private source
//!   container at most once, on first access
//! - 📊 **Observable** - optional tracing integration with JSON or pretty
//!   output
//!
//! ## Quick Start
//!
//! ```rust
//! use container_bridge::prelude::*;
//!
//! #[derive(Debug)]
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! // Declarations the source container is built from
//! let definitions = StaticDefinitions::new("app/di")
//!     .with(
//!         "greeter",
//!         Declaration::object::<Greeter, _>(|_| {
//!             Ok(Greeter {
//!                 greeting: "hello".into(),
//!             })
//!         }),
//!     )
//!     .with("app.motd", Declaration::value("welcome"));
//!
//! let mut builder = BridgeBuilder::new(SourceContainerBuilder::new());
//! builder.add_definition_source(Arc::new(definitions), 0);
//!
//! // Translate everything into the target container
//! let mut target = TargetContainerBuilder::new();
//! builder.initialize_target_container(&mut target).unwrap();
//! let container = target.build();
//!
//! // Services resolve through the runtime resolver, values become parameters
//! let greeter = container.get("greeter").unwrap().downcast::<Greeter>().unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! assert_eq!(
//!     container.parameter("app.motd").unwrap(),
//!     ParamValue::Str("welcome".into())
//! );
//! ```
//!
//! ## Two builds, two purposes
//!
//! The source container is constructed twice, at different times:
//!
//! - a **discovery build** during target-container assembly, used only to
//!   enumerate and classify entries;
//! - a **resolution build** created lazily by the runtime resolver on first
//!   access, wrapping the fully assembled target container so
//!   cross-references resolve correctly.
//!
//! Entries in either container may reference entries in the other: imports
//! alias source identifiers to target identifiers, and the resolver falls
//! back across the boundary in both directions.

mod bridge;
mod builder;
mod callable;
mod config;
mod container;
mod declaration;
mod error;
#[cfg(feature = "logging")]
pub mod logging;
mod source;
mod target;

pub use bridge::*;
pub use builder::*;
pub use callable::*;
pub use config::*;
pub use container::*;
pub use declaration::*;
pub use error::*;
pub use source::*;
pub use target::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Bridge, BridgeBuilder, BridgeConfig, BridgeError, BridgeExtension, BridgeRegistry,
        Callable, ClosureFactory, ContainerAware, ContainerRead, Declaration, DefinitionSource,
        FunctionRegistry, Instance, Lifetime, ParamValue, Parameter, Resolved, Result,
        ServiceDefinition, SourceContainerBuilder, StaticDefinitions, TargetContainer,
        TargetContainerBuilder,
    };
    pub use std::sync::Arc;
}
