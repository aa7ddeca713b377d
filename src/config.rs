//! Configuration surface and extension hooks
//!
//! The configuration mirrors what a host application would put in its
//! bundle config: compilation path, cache toggle, prioritized definition
//! files, the cross-container import map, and prioritized extension hooks.
//! Definition files and extensions are referenced by name and resolved
//! against an explicitly passed [`BridgeRegistry`]; there is no
//! process-wide lookup.

use crate::builder::{order_by_priority, BridgeBuilder};
use crate::error::{BridgeError, Result};
use crate::source::DefinitionSource;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// One configured definition file: a bare name, or a name with a priority
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DefinitionEntry {
    File(String),
    Detailed {
        file: String,
        #[serde(default)]
        priority: i32,
    },
}

impl DefinitionEntry {
    pub fn file(&self) -> &str {
        match self {
            DefinitionEntry::File(file) => file,
            DefinitionEntry::Detailed { file, .. } => file,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            DefinitionEntry::File(_) => 0,
            DefinitionEntry::Detailed { priority, .. } => *priority,
        }
    }
}

/// One configured extension hook: a bare name, or a name with a priority
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtensionEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        priority: i32,
    },
}

impl ExtensionEntry {
    pub fn name(&self) -> &str {
        match self {
            ExtensionEntry::Name(name) => name,
            ExtensionEntry::Detailed { name, .. } => name,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            ExtensionEntry::Name(_) => 0,
            ExtensionEntry::Detailed { priority, .. } => *priority,
        }
    }
}

/// Bridge configuration as the host application declares it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory for compiled discovery-container artifacts; `None`
    /// disables compilation
    pub compilation_path: Option<PathBuf>,
    /// Toggle the source container's definition cache
    pub enable_cache: bool,
    /// Prioritized definition files, by registered source name
    pub definitions: Vec<DefinitionEntry>,
    /// Source-identifier to target-identifier import map
    pub import: BTreeMap<String, String>,
    /// Prioritized hooks invoked with the builder before discovery
    pub extensions: Vec<ExtensionEntry>,
}

/// Hook allowed to reconfigure the bridge builder before the discovery
/// build runs
pub trait BridgeExtension: Send + Sync {
    fn configure(&self, builder: &mut BridgeBuilder) -> Result<()>;
}

/// Factory form of an extension registration
pub type ExtensionFactory = Arc<dyn Fn() -> Arc<dyn BridgeExtension> + Send + Sync>;

enum RegisteredExtension {
    Instance(Arc<dyn BridgeExtension>),
    Factory(ExtensionFactory),
}

/// Named definition sources and extension hooks, supplied by the caller.
#[derive(Default)]
pub struct BridgeRegistry {
    sources: HashMap<String, Arc<dyn DefinitionSource>>,
    extensions: HashMap<String, RegisteredExtension>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition source under its own name
    pub fn add_source(&mut self, source: Arc<dyn DefinitionSource>) -> &mut Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Register a ready extension instance
    pub fn add_extension(
        &mut self,
        name: impl Into<String>,
        extension: Arc<dyn BridgeExtension>,
    ) -> &mut Self {
        self.extensions
            .insert(name.into(), RegisteredExtension::Instance(extension));
        self
    }

    /// Register a constructor for an extension resolved on demand
    pub fn add_extension_factory(
        &mut self,
        name: impl Into<String>,
        factory: ExtensionFactory,
    ) -> &mut Self {
        self.extensions
            .insert(name.into(), RegisteredExtension::Factory(factory));
        self
    }

    fn source(&self, name: &str) -> Option<Arc<dyn DefinitionSource>> {
        self.sources.get(name).map(Arc::clone)
    }

    fn extension(&self, name: &str) -> Option<Arc<dyn BridgeExtension>> {
        match self.extensions.get(name)? {
            RegisteredExtension::Instance(extension) => Some(Arc::clone(extension)),
            RegisteredExtension::Factory(factory) => Some(factory()),
        }
    }
}

impl BridgeConfig {
    /// Push this configuration into a builder, resolving definition files
    /// and extension hooks against the registry.
    ///
    /// Extensions run once each, ordered by descending priority (stable for
    /// equal priorities), before any discovery build.
    pub fn apply(&self, builder: &mut BridgeBuilder, registry: &BridgeRegistry) -> Result<()> {
        if let Some(path) = &self.compilation_path {
            builder.prepare_compilation(Some(path.clone()));
        }
        builder.enable_cache(self.enable_cache);

        for entry in &self.definitions {
            let source = registry.source(entry.file()).ok_or_else(|| {
                BridgeError::InvalidContainer(format!(
                    "definition source `{}` is not registered",
                    entry.file()
                ))
            })?;
            builder.add_definition_source(source, entry.priority());
        }

        for (key, target) in &self.import {
            builder.import(key.clone(), target.clone());
        }

        let ordered = order_by_priority(
            self.extensions
                .iter()
                .map(|entry| (entry.name().to_string(), entry.priority())),
        );

        #[cfg(feature = "logging")]
        debug!(
            target: "container_bridge",
            definitions = self.definitions.len(),
            imports = self.import.len(),
            extensions = ordered.len(),
            "Applying bridge configuration"
        );

        for name in ordered {
            let extension = registry
                .extension(&name)
                .ok_or_else(|| BridgeError::InvalidExtension { name: name.clone() })?;
            extension.configure(builder)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceContainerBuilder, StaticDefinitions};
    use crate::declaration::Declaration;
    use std::sync::Mutex;

    struct RecordingExtension {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl BridgeExtension for RecordingExtension {
        fn configure(&self, builder: &mut BridgeBuilder) -> Result<()> {
            self.log.lock().unwrap().push(self.label);
            builder.import(format!("{}_key", self.label), "shared_target");
            Ok(())
        }
    }

    fn builder() -> BridgeBuilder {
        BridgeBuilder::new(SourceContainerBuilder::new())
    }

    #[test]
    fn test_deserialize_normalizes_bare_and_detailed_entries() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "compilation_path": "/var/cache/bridge",
            "enable_cache": true,
            "definitions": [
                "config/di",
                { "file": "vendor/di", "priority": 10 },
            ],
            "import": { "logger": "app.logger" },
            "extensions": [
                "hooks.first",
                { "name": "hooks.second", "priority": 3 },
            ],
        }))
        .unwrap();

        assert_eq!(config.compilation_path, Some(PathBuf::from("/var/cache/bridge")));
        assert!(config.enable_cache);
        assert_eq!(config.definitions[0].file(), "config/di");
        assert_eq!(config.definitions[0].priority(), 0);
        assert_eq!(config.definitions[1].file(), "vendor/di");
        assert_eq!(config.definitions[1].priority(), 10);
        assert_eq!(config.import["logger"], "app.logger");
        assert_eq!(config.extensions[0].priority(), 0);
        assert_eq!(config.extensions[1].name(), "hooks.second");
    }

    #[test]
    fn test_empty_config_deserializes_with_defaults() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(config.compilation_path.is_none());
        assert!(!config.enable_cache);
        assert!(config.definitions.is_empty());
    }

    #[test]
    fn test_apply_resolves_sources_and_imports() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "definitions": ["app/di"],
            "import": { "hello": "world" },
        }))
        .unwrap();

        let mut registry = BridgeRegistry::new();
        registry.add_source(Arc::new(
            StaticDefinitions::new("app/di").with("greeting", Declaration::value("hi")),
        ));

        let mut bridge_builder = builder();
        config.apply(&mut bridge_builder, &registry).unwrap();

        let mut target = crate::target::TargetContainerBuilder::new();
        bridge_builder.initialize_target_container(&mut target).unwrap();
        assert!(target.parameter("greeting").is_some());
        assert_eq!(target.alias_target("hello"), Some("world"));
    }

    #[test]
    fn test_apply_rejects_unregistered_definition_source() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "definitions": ["nowhere/di"],
        }))
        .unwrap();

        let err = config
            .apply(&mut builder(), &BridgeRegistry::new())
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidContainer(_)));
    }

    #[test]
    fn test_extensions_run_by_descending_priority_stable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = BridgeRegistry::new();
        for (label, _) in [("low_a", 0), ("high", 10), ("low_b", 0)] {
            registry.add_extension(
                label,
                Arc::new(RecordingExtension {
                    label,
                    log: Arc::clone(&log),
                }),
            );
        }

        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "extensions": [
                "low_a",
                { "name": "high", "priority": 10 },
                "low_b",
            ],
        }))
        .unwrap();

        config.apply(&mut builder(), &registry).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["high", "low_a", "low_b"]);
    }

    #[test]
    fn test_extension_factory_is_resolved_on_demand() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::clone(&log);
        let mut registry = BridgeRegistry::new();
        registry.add_extension_factory(
            "made",
            Arc::new(move || -> Arc<dyn BridgeExtension> {
                Arc::new(RecordingExtension {
                    label: "made",
                    log: Arc::clone(&observer),
                })
            }),
        );

        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "extensions": ["made"],
        }))
        .unwrap();

        config.apply(&mut builder(), &registry).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["made"]);
    }

    #[test]
    fn test_unknown_extension_is_invalid() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "extensions": ["ghost"],
        }))
        .unwrap();

        let err = config
            .apply(&mut builder(), &BridgeRegistry::new())
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidExtension { name } if name == "ghost"));
    }
}
