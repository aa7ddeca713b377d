//! Translation pass from source-container declarations to target-container
//! registrations
//!
//! The builder accumulates prioritized definition sources and cross-container
//! imports, runs a discovery build of the source container, classifies every
//! known entry, and emits the matching target-container registration: a
//! service definition delegating to the runtime resolver, a plain alias, or
//! a parameter. Registrations are committed all-or-nothing; any invalid
//! entry aborts the whole pass.

use crate::bridge::BridgeSpec;
use crate::container::{ContainerRead, DefinitionIntrospection};
use crate::declaration::{Declaration, FactoryDeclaration, ParamValue, RawValue, ReferenceDeclaration, Resolved};
use crate::error::{BridgeError, Result};
use crate::source::{DefinitionSource, SourceContainerBuilder};
use crate::target::{Parameter, ServiceDefinition, TargetContainerBuilder};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Reserved prefix for the parameter holding an environment declaration's
/// default value
pub const DEFAULT_ENV_VALUE_PREFIX: &str = "bridge_default_";

/// Stable ordering by descending priority: buckets are emitted highest
/// priority first, insertion order preserved within a bucket
pub(crate) fn order_by_priority<T>(items: impl IntoIterator<Item = (T, i32)>) -> Vec<T> {
    let mut buckets: BTreeMap<i32, Vec<T>> = BTreeMap::new();
    for (item, priority) in items {
        buckets.entry(priority).or_default().push(item);
    }
    buckets.into_values().rev().flatten().collect()
}

/// Read-only snapshot of the target builder, handed to the discovery build
/// as its fallback container.
///
/// The target container is still being assembled at that point, so lookups
/// answer existence only; nothing can be instantiated yet.
struct TargetBuilderView {
    service_ids: HashSet<String>,
}

impl TargetBuilderView {
    fn snapshot(target: &TargetContainerBuilder) -> Self {
        Self {
            service_ids: target.service_ids().into_iter().collect(),
        }
    }
}

impl ContainerRead for TargetBuilderView {
    fn get(&self, id: &str) -> Result<Resolved> {
        Err(BridgeError::not_found(id))
    }

    fn has(&self, id: &str) -> bool {
        self.service_ids.contains(id)
    }
}

/// Registrations accumulated during one translation pass, applied only
/// after every entry validated
#[derive(Default)]
struct TranslationSet {
    services: Vec<(String, ServiceDefinition)>,
    aliases: Vec<(String, String)>,
    parameters: Vec<(String, Parameter)>,
    bridge: Option<BridgeSpec>,
}

impl TranslationSet {
    fn apply(self, target: &mut TargetContainerBuilder) {
        for (id, definition) in self.services {
            target.register_service(id, definition);
        }
        for (from, to) in self.aliases {
            target.set_alias(from, to);
        }
        for (name, parameter) in self.parameters {
            target.set_parameter(name, parameter);
        }
        if let Some(spec) = self.bridge {
            target.set_bridge(spec);
        }
    }
}

/// Outcome of following an entry's reference chain
enum Extracted {
    /// Chain ended on a non-reference declaration
    Grounded(Declaration),
    /// Chain fell off the still-incomplete target container; the last
    /// reference is kept and fixed up at runtime
    Unresolved(ReferenceDeclaration),
}

/// Accumulates the bridge configuration and runs the translation pass
pub struct BridgeBuilder {
    source_builder: SourceContainerBuilder,
    sources: Vec<(Arc<dyn DefinitionSource>, i32)>,
    imports: BTreeMap<String, String>,
    compilation_path: Option<PathBuf>,
    cache_enabled: bool,
    types: HashSet<String>,
}

impl BridgeBuilder {
    /// Create a builder around a source-container builder prototype.
    ///
    /// The prototype carries the function registry and any custom container
    /// constructor; the bridge clones it for the discovery build and hands
    /// another clone to the runtime resolver.
    pub fn new(source_builder: SourceContainerBuilder) -> Self {
        Self {
            source_builder,
            sources: Vec::new(),
            imports: BTreeMap::new(),
            compilation_path: None,
            cache_enabled: false,
            types: HashSet::new(),
        }
    }

    /// Append one definition source.
    ///
    /// Re-adding a source name replaces its priority but keeps its original
    /// position; the effective order is computed at build time.
    pub fn add_definition_source(
        &mut self,
        source: Arc<dyn DefinitionSource>,
        priority: i32,
    ) -> &mut Self {
        if let Some(slot) = self
            .sources
            .iter_mut()
            .find(|(existing, _)| existing.name() == source.name())
        {
            *slot = (source, priority);
        } else {
            self.sources.push((source, priority));
        }
        self
    }

    /// Append several definition sources at once
    pub fn load_definitions<I>(&mut self, definitions: I) -> &mut Self
    where
        I: IntoIterator<Item = (Arc<dyn DefinitionSource>, i32)>,
    {
        for (source, priority) in definitions {
            self.add_definition_source(source, priority);
        }
        self
    }

    /// Enable compiled discovery-container generation under `path`.
    ///
    /// A performance hint only; translation semantics are unchanged.
    pub fn prepare_compilation(&mut self, path: Option<PathBuf>) -> &mut Self {
        self.compilation_path = path;
        self
    }

    /// Toggle the source container's definition cache
    pub fn enable_cache(&mut self, enable: bool) -> &mut Self {
        self.cache_enabled = enable;
        self
    }

    /// Declare that resolving `source_key` in the source container yields
    /// the target container's `target_key`.
    ///
    /// A duplicate `source_key` overwrites the previous mapping.
    pub fn import(&mut self, source_key: impl Into<String>, target_key: impl Into<String>) -> &mut Self {
        self.imports.insert(source_key.into(), target_key.into());
        self
    }

    /// Register a loadable type; entries named after it are registered as
    /// object-backed services regardless of their own declaration
    pub fn register_type<T: ?Sized + 'static>(&mut self) -> &mut Self {
        self.register_type_name(std::any::type_name::<T>())
    }

    /// Same as [`BridgeBuilder::register_type`], by explicit name
    pub fn register_type_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.types.insert(name.into());
        self
    }

    /// Definition sources ordered by descending priority, stable
    fn ordered_sources(&self) -> Vec<Arc<dyn DefinitionSource>> {
        order_by_priority(
            self.sources
                .iter()
                .map(|(source, priority)| (Arc::clone(source), *priority)),
        )
    }

    /// Run the translation pass against a target container under assembly.
    ///
    /// Builds the discovery container, classifies every known entry, and
    /// commits the translated registrations plus the runtime-resolver
    /// wiring. Nothing is committed if any entry fails.
    pub fn initialize_target_container(&self, target: &mut TargetContainerBuilder) -> Result<()> {
        let ordered = self.ordered_sources();

        let view: Arc<dyn ContainerRead> = Arc::new(TargetBuilderView::snapshot(target));
        let mut discovery_builder = self
            .source_builder
            .clone()
            .wrap_container(view)
            .enable_cache(self.cache_enabled);
        if let Some(path) = &self.compilation_path {
            discovery_builder = discovery_builder.enable_compilation(path);
        }
        for source in &ordered {
            discovery_builder = discovery_builder.add_definitions(Arc::clone(source));
        }
        for (key, target_key) in &self.imports {
            discovery_builder = discovery_builder.add_import(key.clone(), target_key.clone());
        }

        let discovery = discovery_builder.build();
        let Some(introspection) = discovery.introspection() else {
            return Err(BridgeError::InvalidContainer(
                "the discovery container does not expose its definitions".to_string(),
            ));
        };

        let entry_names = introspection.known_entry_names();

        #[cfg(feature = "logging")]
        debug!(
            target: "container_bridge",
            entries = entry_names.len(),
            sources = ordered.len(),
            imports = self.imports.len(),
            "Translating source-container entries"
        );

        let mut set = TranslationSet::default();
        for entry in entry_names {
            if self.types.contains(&entry) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "container_bridge",
                    entry = %entry,
                    "Entry names a loadable type, registering object-backed service"
                );
                set.services
                    .push((entry.clone(), ServiceDefinition::bridged(entry.clone(), entry)));
                continue;
            }

            match self.extract(introspection, &entry)? {
                Extracted::Grounded(declaration) => self.convert(&entry, &declaration, &mut set)?,
                Extracted::Unresolved(reference) => {
                    set.aliases.push((entry, reference.target));
                }
            }
        }

        set.bridge = Some(BridgeSpec {
            builder: self.source_builder.clone(),
            sources: ordered,
            imports: self.imports.clone(),
            compilation_path: self.compilation_path.clone(),
            cache_enabled: self.cache_enabled,
        });

        set.apply(target);
        Ok(())
    }

    /// Follow an entry's reference chain until it grounds.
    ///
    /// A chain that runs into a name with no declaration keeps its last
    /// reference: the name points into the still-incomplete target
    /// container and resolves at runtime. A name with no declaration and no
    /// reference seen en route does not exist anywhere.
    fn extract(
        &self,
        container: &dyn DefinitionIntrospection,
        entry: &str,
    ) -> Result<Extracted> {
        let mut name = entry.to_string();
        let mut last_reference: Option<ReferenceDeclaration> = None;
        loop {
            match container.extract_definition(&name) {
                Some(Declaration::Reference(reference)) => {
                    name = reference.target.clone();
                    last_reference = Some(reference);
                }
                Some(declaration) => return Ok(Extracted::Grounded(declaration)),
                None => {
                    return match last_reference {
                        Some(reference) => Ok(Extracted::Unresolved(reference)),
                        None => Err(BridgeError::not_found(entry)),
                    };
                }
            }
        }
    }

    /// Dispatch one grounded declaration to its translated registration
    fn convert(&self, entry: &str, declaration: &Declaration, set: &mut TranslationSet) -> Result<()> {
        #[cfg(feature = "logging")]
        trace!(
            target: "container_bridge",
            entry = entry,
            kind = declaration.kind(),
            "Translating entry"
        );

        match declaration {
            Declaration::Object(object) => {
                set.services
                    .push((entry.to_string(), ServiceDefinition::bridged(object.class.clone(), entry)));
            }
            Declaration::Factory(factory) => {
                let class = self.class_from_factory(entry, factory)?;
                set.services
                    .push((entry.to_string(), ServiceDefinition::bridged(class, entry)));
            }
            Declaration::Reference(reference) => {
                set.aliases.push((entry.to_string(), reference.target.clone()));
            }
            Declaration::Environment(env) => match &env.default {
                None => set.parameters.push((
                    entry.to_string(),
                    Parameter::Env {
                        variable: env.variable.clone(),
                        fallback: None,
                    },
                )),
                Some(default) => {
                    let holder = format!("{DEFAULT_ENV_VALUE_PREFIX}{entry}");
                    set.parameters
                        .push((holder.clone(), Parameter::Value(default.clone())));
                    set.parameters.push((
                        entry.to_string(),
                        Parameter::Env {
                            variable: env.variable.clone(),
                            fallback: Some(holder),
                        },
                    ));
                }
            },
            Declaration::StringExpr(string) => {
                set.parameters.push((
                    entry.to_string(),
                    Parameter::Value(ParamValue::Str(string.expression.clone())),
                ));
            }
            Declaration::Value(value) => match &value.value {
                RawValue::Param(param) => {
                    set.parameters
                        .push((entry.to_string(), Parameter::Value(param.clone())));
                }
                RawValue::Instance(_) => {
                    return Err(BridgeError::InvalidParameterValue {
                        entry: entry.to_string(),
                    });
                }
            },
            Declaration::Array(array) => {
                set.parameters
                    .push((entry.to_string(), Parameter::Value(array.flatten())));
            }
        }
        Ok(())
    }

    /// Infer the concrete class a factory produces from its callable
    /// descriptor; the target container needs the name up front
    fn class_from_factory(&self, entry: &str, factory: &FactoryDeclaration) -> Result<String> {
        let (return_type, _) = factory
            .callable
            .describe(entry, self.source_builder.functions())?;
        match return_type {
            crate::callable::ReturnType::Named(name) => Ok(name),
            other => Err(BridgeError::InvalidReturnType {
                entry: entry.to_string(),
                found: other.describe(),
            }),
        }
    }
}
