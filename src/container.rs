//! Source-container forms and their shared resolution core
//!
//! The bridge needs two capabilities from a built source container: a
//! PSR-style lookup surface ([`ContainerRead`]) and, during discovery,
//! introspection over the raw declarations ([`DefinitionIntrospection`]).
//! Two concrete forms exist, plain and compiled; they differ only in how
//! their definition map was produced.

use crate::callable::FunctionRegistry;
use crate::declaration::{Declaration, Lifetime, ParamValue, RawValue, Resolved};
use crate::error::{BridgeError, Result};
use crate::source::{ContainerParts, DefinitionMap};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// PSR-style lookup surface shared by every container in the bridge
pub trait ContainerRead: Send + Sync {
    /// Resolve an entry by identifier
    fn get(&self, id: &str) -> Result<Resolved>;

    /// Whether an entry exists; never errors
    fn has(&self, id: &str) -> bool;
}

/// Introspection over raw declarations, used only during discovery.
///
/// `extract_definition` never errors: extraction failures are uniformly
/// treated as absence.
pub trait DefinitionIntrospection {
    /// Every entry name this container declares, in declaration order
    fn known_entry_names(&self) -> Vec<String>;

    /// The raw declaration behind a name, without triggering instantiation
    fn extract_definition(&self, name: &str) -> Option<Declaration>;
}

/// Contract of a built source container.
///
/// Custom constructors may build containers without introspection; the
/// bridge builder treats that as a misconfiguration during discovery.
pub trait BridgedContainer: ContainerRead {
    /// Explicit upcast to the lookup surface
    fn as_read(&self) -> &dyn ContainerRead;

    /// Introspection capability, when the form provides one
    fn introspection(&self) -> Option<&dyn DefinitionIntrospection> {
        None
    }
}

// =============================================================================
// Shared resolution core
// =============================================================================

/// Resolution engine shared by the plain and compiled container forms
pub(crate) struct ContainerCore {
    definitions: Arc<DefinitionMap>,
    wrapped: Option<Arc<dyn ContainerRead>>,
    functions: FunctionRegistry,
    /// Memoized singleton-scope entries
    singletons: DashMap<String, Resolved, RandomState>,
}

impl ContainerCore {
    fn new(parts: ContainerParts) -> Self {
        Self {
            definitions: parts.definitions,
            wrapped: parts.wrapped,
            functions: parts.functions,
            singletons: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn get(&self, id: &str) -> Result<Resolved> {
        if let Some(declaration) = self.definitions.get(id) {
            #[cfg(feature = "logging")]
            trace!(
                target: "container_bridge",
                entry = id,
                kind = declaration.kind(),
                "Resolving source-container entry"
            );
            return self.resolve_declaration(id, declaration);
        }
        Err(BridgeError::not_found(id))
    }

    fn has(&self, id: &str) -> bool {
        self.definitions.contains(id)
    }

    /// The container dependencies resolve through: the wrapped container
    /// when one is set, the container itself otherwise.
    ///
    /// Direct `get`/`has` serve only this container's own entries; the
    /// wrapped container comes into play for references and for whatever a
    /// construct or factory callable looks up.
    fn delegate(&self) -> &dyn ContainerRead {
        match &self.wrapped {
            Some(wrapped) => wrapped.as_ref(),
            None => self,
        }
    }

    fn resolve_declaration(&self, name: &str, declaration: &Declaration) -> Result<Resolved> {
        match declaration {
            Declaration::Object(object) => self.shared(name, object.lifetime, || {
                (object.construct)(self.delegate()).map(Resolved::Instance)
            }),
            Declaration::Factory(factory) => {
                let (_, call) = factory.callable.describe(name, &self.functions)?;
                self.shared(name, factory.lifetime, || call(self.delegate()))
            }
            Declaration::Reference(reference) => self.delegate().get(&reference.target),
            Declaration::Environment(env) => match std::env::var(&env.variable) {
                Ok(value) => Ok(Resolved::Value(ParamValue::Str(value))),
                Err(_) => env.default.clone().map(Resolved::Value).ok_or_else(|| {
                    BridgeError::creation_failed(
                        name,
                        format!("environment variable `{}` is not set", env.variable),
                    )
                }),
            },
            Declaration::StringExpr(string) => {
                Ok(Resolved::Value(ParamValue::Str(string.expression.clone())))
            }
            Declaration::Value(value) => Ok(match &value.value {
                RawValue::Param(param) => Resolved::Value(param.clone()),
                RawValue::Instance(instance) => Resolved::Instance(instance.clone()),
            }),
            Declaration::Array(array) => Ok(Resolved::Value(array.flatten())),
        }
    }

    /// Memoize singleton-scope entries; transient entries resolve fresh
    fn shared<F>(&self, name: &str, lifetime: Lifetime, produce: F) -> Result<Resolved>
    where
        F: FnOnce() -> Result<Resolved>,
    {
        if lifetime == Lifetime::Transient {
            return produce();
        }
        if let Some(hit) = self.singletons.get(name) {
            return Ok(hit.value().clone());
        }
        let value = produce()?;
        self.singletons.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

impl ContainerRead for ContainerCore {
    fn get(&self, id: &str) -> Result<Resolved> {
        ContainerCore::get(self, id)
    }

    fn has(&self, id: &str) -> bool {
        ContainerCore::has(self, id)
    }
}

// =============================================================================
// Container forms
// =============================================================================

/// Plain source container, definitions merged at build time
pub struct SourceContainer {
    core: ContainerCore,
}

impl SourceContainer {
    pub(crate) fn new(parts: ContainerParts) -> Self {
        Self {
            core: ContainerCore::new(parts),
        }
    }
}

impl ContainerRead for SourceContainer {
    fn get(&self, id: &str) -> Result<Resolved> {
        self.core.get(id)
    }

    fn has(&self, id: &str) -> bool {
        self.core.has(id)
    }
}

impl DefinitionIntrospection for SourceContainer {
    fn known_entry_names(&self) -> Vec<String> {
        self.core.definitions.names()
    }

    fn extract_definition(&self, name: &str) -> Option<Declaration> {
        self.core.definitions.get(name).cloned()
    }
}

impl BridgedContainer for SourceContainer {
    fn as_read(&self) -> &dyn ContainerRead {
        self
    }

    fn introspection(&self) -> Option<&dyn DefinitionIntrospection> {
        Some(self)
    }
}

/// Compiled source container, built from a reusable definition snapshot.
///
/// Identical contract to [`SourceContainer`]; only the performance
/// characteristics of its construction differ.
pub struct CompiledSourceContainer {
    core: ContainerCore,
}

impl CompiledSourceContainer {
    pub(crate) fn new(parts: ContainerParts) -> Self {
        Self {
            core: ContainerCore::new(parts),
        }
    }
}

impl ContainerRead for CompiledSourceContainer {
    fn get(&self, id: &str) -> Result<Resolved> {
        self.core.get(id)
    }

    fn has(&self, id: &str) -> bool {
        self.core.has(id)
    }
}

impl DefinitionIntrospection for CompiledSourceContainer {
    fn known_entry_names(&self) -> Vec<String> {
        self.core.definitions.names()
    }

    fn extract_definition(&self, name: &str) -> Option<Declaration> {
        self.core.definitions.get(name).cloned()
    }
}

impl BridgedContainer for CompiledSourceContainer {
    fn as_read(&self) -> &dyn ContainerRead {
        self
    }

    fn introspection(&self) -> Option<&dyn DefinitionIntrospection> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Instance;
    use crate::source::{SourceContainerBuilder, StaticDefinitions};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Engine {
        serial: u32,
    }

    #[derive(Debug)]
    struct Consumer {
        value: ParamValue,
    }

    struct FixedFallback;

    impl ContainerRead for FixedFallback {
        fn get(&self, id: &str) -> Result<Resolved> {
            if id == "fallback_entry" {
                return Ok(Resolved::Value(ParamValue::Str("from-fallback".into())));
            }
            Err(BridgeError::not_found(id))
        }

        fn has(&self, id: &str) -> bool {
            id == "fallback_entry"
        }
    }

    fn engine_counter_container(counter: Arc<AtomicU32>, transient: bool) -> Arc<dyn BridgedContainer> {
        let mut declaration = Declaration::object::<Engine, _>(move |_| {
            Ok(Engine {
                serial: counter.fetch_add(1, Ordering::SeqCst),
            })
        });
        if transient {
            declaration = declaration.transient();
        }
        let source = StaticDefinitions::new("engines").with("engine", declaration);
        SourceContainerBuilder::new()
            .add_definitions(Arc::new(source))
            .build()
    }

    #[test]
    fn test_singleton_constructed_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = engine_counter_container(Arc::clone(&counter), false);

        let first = container.get("engine").unwrap();
        let second = container.get("engine").unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let first = first.downcast::<Engine>().unwrap();
        let second = second.downcast::<Engine>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_transient_constructed_every_resolve() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = engine_counter_container(Arc::clone(&counter), true);

        let first = container.get("engine").unwrap();
        let second = container.get("engine").unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_ne!(
            first.downcast::<Engine>().unwrap().serial,
            second.downcast::<Engine>().unwrap().serial
        );
    }

    #[test]
    fn test_reference_follows_to_terminal_declaration() {
        let source = StaticDefinitions::new("refs")
            .with("leaf", Declaration::value("grounded"))
            .with("middle", Declaration::reference("leaf"))
            .with("head", Declaration::reference("middle"));
        let container = SourceContainerBuilder::new()
            .add_definitions(Arc::new(source))
            .build();

        let resolved = container.get("head").unwrap();
        assert_eq!(resolved.as_value(), Some(&ParamValue::Str("grounded".into())));
    }

    #[test]
    fn test_dependencies_resolve_through_wrapped_container() {
        let source = StaticDefinitions::new("wrapped").with(
            "consumer",
            Declaration::object::<Consumer, _>(|container| {
                let Some(value) = container.get("fallback_entry")?.as_value().cloned() else {
                    return Err(BridgeError::creation_failed("consumer", "expected a value"));
                };
                Ok(Consumer { value })
            }),
        );
        let container = SourceContainerBuilder::new()
            .add_definitions(Arc::new(source))
            .wrap_container(Arc::new(FixedFallback))
            .build();

        let consumer = container.get("consumer").unwrap().downcast::<Consumer>().unwrap();
        assert_eq!(consumer.value, ParamValue::Str("from-fallback".into()));

        // direct lookups serve only this container's own entries
        assert!(!container.has("fallback_entry"));
        assert!(container.get("fallback_entry").is_err());
    }

    #[test]
    fn test_environment_declaration_prefers_process_value() {
        // SAFETY: test-only process-environment mutation, variable name is
        // unique to this test
        unsafe { std::env::set_var("CONTAINER_BRIDGE_TEST_CORE_ENV", "live") };
        let source = StaticDefinitions::new("env")
            .with(
                "with_default",
                Declaration::env_with_default("CONTAINER_BRIDGE_TEST_CORE_ENV", "fallback"),
            )
            .with(
                "unset_with_default",
                Declaration::env_with_default("CONTAINER_BRIDGE_TEST_CORE_UNSET", "fallback"),
            )
            .with("unset_bare", Declaration::env("CONTAINER_BRIDGE_TEST_CORE_UNSET"));
        let container = SourceContainerBuilder::new()
            .add_definitions(Arc::new(source))
            .build();

        assert_eq!(
            container.get("with_default").unwrap().as_value(),
            Some(&ParamValue::Str("live".into()))
        );
        assert_eq!(
            container.get("unset_with_default").unwrap().as_value(),
            Some(&ParamValue::Str("fallback".into()))
        );
        assert!(matches!(
            container.get("unset_bare").unwrap_err(),
            BridgeError::CreationFailed { .. }
        ));
    }

    #[test]
    fn test_value_declaration_may_hold_an_instance_at_runtime() {
        let source = StaticDefinitions::new("values").with(
            "prebuilt",
            Declaration::instance_value(Instance::new(Engine { serial: 9 })),
        );
        let container = SourceContainerBuilder::new()
            .add_definitions(Arc::new(source))
            .build();

        let engine = container.get("prebuilt").unwrap().downcast::<Engine>().unwrap();
        assert_eq!(engine.serial, 9);
    }

    #[test]
    fn test_extract_definition_is_absence_not_error() {
        let container = SourceContainerBuilder::new().build();
        let introspection = container.introspection().unwrap();
        assert!(introspection.extract_definition("anything").is_none());
        assert!(introspection.known_entry_names().is_empty());
    }
}
