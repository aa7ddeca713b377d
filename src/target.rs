//! Declarative target-container model
//!
//! The minimum surface the bridge's contract needs from the declarative
//! side: service definitions, aliases and a parameter store behind a
//! builder, then a read-only built container. Translated registrations
//! land here, and the runtime resolver reads services and parameters back
//! out of the built container.

use crate::bridge::{Bridge, BridgeSpec};
use crate::declaration::{Instance, ParamValue, Resolved};
use crate::error::{BridgeError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Capability marker for values that want the target container injected
/// after resolution
pub trait ContainerAware: Send + Sync {
    fn attach_container(&self, container: Arc<TargetContainer>);
}

/// How a target-container service produces its value
#[derive(Clone)]
pub enum ServiceFactory {
    /// Delegate to the runtime resolver for a bridged entry
    Bridged { entry: String },
    /// Pre-built shared instance
    Instance(Instance),
    /// Factory native to the target container
    Native(NativeFactory),
}

/// Native factory body, resolving dependencies through the built container
pub type NativeFactory = Arc<dyn Fn(&Arc<TargetContainer>) -> Result<Resolved> + Send + Sync>;

/// One service registration of the declarative container
#[derive(Clone)]
pub struct ServiceDefinition {
    pub class: String,
    pub factory: ServiceFactory,
    pub public: bool,
}

impl ServiceDefinition {
    /// Service delegating to the runtime resolver
    pub fn bridged(class: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            factory: ServiceFactory::Bridged {
                entry: entry.into(),
            },
            public: true,
        }
    }

    /// Service backed by a pre-built instance
    pub fn from_instance(class: impl Into<String>, instance: Instance) -> Self {
        Self {
            class: class.into(),
            factory: ServiceFactory::Instance(instance),
            public: true,
        }
    }

    /// Service backed by a native factory; the class name is taken from `T`
    pub fn native<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<TargetContainer>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            class: std::any::type_name::<T>().to_string(),
            factory: ServiceFactory::Native(Arc::new(move |container| {
                Ok(Resolved::Instance(Instance::new(factory(container)?)))
            })),
            public: true,
        }
    }

    /// Mark the definition private
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }
}

/// One parameter of the declarative container.
///
/// The `Env` form is the environment-expression style: read the variable at
/// access time, falling back to another parameter holding the default.
#[derive(Debug, Clone)]
pub enum Parameter {
    Value(ParamValue),
    Env {
        variable: String,
        fallback: Option<String>,
    },
}

// =============================================================================
// Builder
// =============================================================================

/// Mutable assembly surface for the declarative container
#[derive(Default)]
pub struct TargetContainerBuilder {
    services: HashMap<String, ServiceDefinition>,
    aliases: HashMap<String, String>,
    parameters: HashMap<String, Parameter>,
    bridge: Option<BridgeSpec>,
}

impl TargetContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service definition, replacing any previous one
    pub fn register_service(&mut self, id: impl Into<String>, definition: ServiceDefinition) -> &mut Self {
        self.services.insert(id.into(), definition);
        self
    }

    /// Register a pre-built shared instance; the class name is taken from `T`
    pub fn set_instance<T: Send + Sync + 'static>(&mut self, id: impl Into<String>, value: T) -> &mut Self {
        self.register_service(
            id,
            ServiceDefinition::from_instance(std::any::type_name::<T>(), Instance::new(value)),
        )
    }

    /// Register an alias from one identifier to another
    pub fn set_alias(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    /// Set a parameter, replacing any previous value
    pub fn set_parameter(&mut self, name: impl Into<String>, parameter: Parameter) -> &mut Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    /// Wire the runtime resolver this container will lazily construct
    pub fn set_bridge(&mut self, spec: BridgeSpec) -> &mut Self {
        self.bridge = Some(spec);
        self
    }

    /// Whether a service or alias is registered under this identifier
    pub fn has_service(&self, id: &str) -> bool {
        self.services.contains_key(id) || self.aliases.contains_key(id)
    }

    /// Registered service definition, if any
    pub fn service(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.get(id)
    }

    /// Alias target, if any
    pub fn alias_target(&self, id: &str) -> Option<&str> {
        self.aliases.get(id).map(String::as_str)
    }

    /// Registered parameter, if any
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Service identifiers known to the builder, aliases included
    pub fn service_ids(&self) -> Vec<String> {
        self.services
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect()
    }

    /// Finalize into the read-only container
    pub fn build(self) -> Arc<TargetContainer> {
        #[cfg(feature = "logging")]
        debug!(
            target: "container_bridge",
            services = self.services.len(),
            aliases = self.aliases.len(),
            parameters = self.parameters.len(),
            bridged = self.bridge.is_some(),
            "Building target container"
        );

        Arc::new(TargetContainer {
            services: self.services,
            aliases: self.aliases,
            parameters: self.parameters,
            bridge_spec: self.bridge,
            resolved: DashMap::with_hasher(RandomState::new()),
            bridge: OnceCell::new(),
        })
    }
}

// =============================================================================
// Built container
// =============================================================================

/// The built declarative container: read-only after assembly
pub struct TargetContainer {
    services: HashMap<String, ServiceDefinition>,
    aliases: HashMap<String, String>,
    parameters: HashMap<String, Parameter>,
    bridge_spec: Option<BridgeSpec>,
    /// Memoized native singletons
    resolved: DashMap<String, Resolved, RandomState>,
    /// Runtime resolver, constructed at most once
    bridge: OnceCell<Arc<Bridge>>,
}

impl TargetContainer {
    fn canonical_id<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        while let Some(next) = self.aliases.get(current) {
            current = next;
        }
        current
    }

    /// Whether a service is registered under this identifier, following
    /// alias chains
    pub fn has(&self, id: &str) -> bool {
        self.services.contains_key(self.canonical_id(id))
    }

    /// Resolve a service, following alias chains.
    ///
    /// Bridged definitions delegate to the runtime resolver on every call;
    /// instance identity for those is governed by the source container's
    /// per-entry scope, not by this container.
    pub fn get(self: &Arc<Self>, id: &str) -> Result<Resolved> {
        let canonical = self.canonical_id(id).to_string();
        let Some(definition) = self.services.get(&canonical) else {
            return Err(BridgeError::not_found(id));
        };
        match &definition.factory {
            ServiceFactory::Bridged { entry } => self.bridge()?.resolve(entry),
            ServiceFactory::Instance(instance) => Ok(Resolved::Instance(instance.clone())),
            ServiceFactory::Native(factory) => {
                if let Some(hit) = self.resolved.get(&canonical) {
                    return Ok(hit.value().clone());
                }
                let value = factory(self)?;
                self.resolved.insert(canonical, value.clone());
                Ok(value)
            }
        }
    }

    /// Whether a parameter is registered under this name
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Read a parameter, evaluating environment expressions at access time
    pub fn parameter(&self, name: &str) -> Result<ParamValue> {
        match self.parameters.get(name) {
            None => Err(BridgeError::not_found(name)),
            Some(Parameter::Value(value)) => Ok(value.clone()),
            Some(Parameter::Env { variable, fallback }) => match std::env::var(variable) {
                Ok(value) => Ok(ParamValue::Str(value)),
                Err(_) => match fallback {
                    Some(holder) => self.parameter(holder),
                    None => Err(BridgeError::creation_failed(
                        name,
                        format!("environment variable `{variable}` is not set"),
                    )),
                },
            },
        }
    }

    /// The runtime resolver, constructed on first access
    pub fn bridge(self: &Arc<Self>) -> Result<Arc<Bridge>> {
        let spec = self.bridge_spec.as_ref().ok_or_else(|| {
            BridgeError::InvalidContainer(
                "no runtime resolver is registered in this container".to_string(),
            )
        })?;
        let bridge = self.bridge.get_or_init(|| {
            Arc::new_cyclic(|me| Bridge::new(spec.clone(), Arc::downgrade(self), me.clone()))
        });
        Ok(Arc::clone(bridge))
    }
}
