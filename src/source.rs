//! Definition sources and the source-container builder
//!
//! Definition sources are the ordered, prioritizable bundles of declarations
//! the convention-driven container is built from. The builder merges them,
//! wraps an optional fallback container, and produces either a plain or a
//! compiled source container.

use crate::callable::FunctionRegistry;
use crate::container::{BridgedContainer, CompiledSourceContainer, ContainerRead, SourceContainer};
use crate::declaration::Declaration;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// A named bundle of entry declarations.
///
/// `load` is called once per container build, which makes build counts
/// observable from the outside.
pub trait DefinitionSource: Send + Sync {
    /// Stable identifier of this source, also its key in registries and caches
    fn name(&self) -> &str;

    /// Produce the declarations this source contributes
    fn load(&self) -> Vec<(String, Declaration)>;
}

/// In-memory definition source
pub struct StaticDefinitions {
    name: String,
    entries: Vec<(String, Declaration)>,
}

impl StaticDefinitions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Add one declaration, consuming and returning the source
    pub fn with(mut self, entry: impl Into<String>, declaration: Declaration) -> Self {
        self.entries.push((entry.into(), declaration));
        self
    }
}

impl DefinitionSource for StaticDefinitions {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Vec<(String, Declaration)> {
        self.entries.clone()
    }
}

// =============================================================================
// Ordered definition map
// =============================================================================

/// Ordered entry map with the source container's merge semantics.
///
/// Later inserts win on duplicate keys, but an entry keeps the position of
/// its first writer. Enumeration order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct DefinitionMap {
    order: Vec<String>,
    entries: std::collections::HashMap<String, Declaration>,
}

impl DefinitionMap {
    pub fn insert(&mut self, name: String, declaration: Declaration) {
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, declaration);
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entry names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// =============================================================================
// Process-wide caches
// =============================================================================

/// Loaded definitions memoized by source name when the cache is enabled
static LOADED_DEFINITIONS: Lazy<DashMap<String, Arc<Vec<(String, Declaration)>>, RandomState>> =
    Lazy::new(|| DashMap::with_hasher(RandomState::new()));

/// Merged definition snapshots keyed by compilation path
static COMPILED_SNAPSHOTS: Lazy<DashMap<PathBuf, Arc<DefinitionMap>, RandomState>> =
    Lazy::new(|| DashMap::with_hasher(RandomState::new()));

fn compiled_snapshot(path: &Path) -> Option<Arc<DefinitionMap>> {
    COMPILED_SNAPSHOTS.get(path).map(|entry| Arc::clone(entry.value()))
}

fn store_compiled_snapshot(path: &Path, map: Arc<DefinitionMap>) {
    write_manifest(path, &map);
    COMPILED_SNAPSHOTS.insert(path.to_path_buf(), map);
}

/// Write the entry-name manifest into the compilation directory.
///
/// Compilation is a performance hint only, so a failed write is logged and
/// otherwise ignored.
fn write_manifest(path: &Path, map: &DefinitionMap) {
    let manifest = map.names().join("\n");
    let result = std::fs::create_dir_all(path)
        .and_then(|()| std::fs::write(path.join("container.manifest"), manifest));
    if let Err(_err) = result {
        #[cfg(feature = "logging")]
        warn!(
            target: "container_bridge",
            path = %path.display(),
            error = %_err,
            "Failed to write compiled container manifest"
        );
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Everything a container constructor needs to assemble a source container
pub struct ContainerParts {
    pub definitions: Arc<DefinitionMap>,
    pub wrapped: Option<Arc<dyn ContainerRead>>,
    pub functions: FunctionRegistry,
}

/// Pluggable constructor for the built container.
///
/// The default constructors produce the two shipped container forms; a
/// custom one may build anything implementing [`BridgedContainer`], though
/// the bridge builder requires the introspection capability during
/// discovery.
pub type ContainerConstructor = Arc<dyn Fn(ContainerParts) -> Arc<dyn BridgedContainer> + Send + Sync>;

/// Builder for the convention-driven source container.
///
/// Cloneable: the runtime resolver keeps a clone as a prototype and
/// reconfigures it for the resolution build.
#[derive(Clone, Default)]
pub struct SourceContainerBuilder {
    sources: Vec<Arc<dyn DefinitionSource>>,
    imports: BTreeMap<String, String>,
    wrapped: Option<Arc<dyn ContainerRead>>,
    functions: FunctionRegistry,
    compilation_path: Option<PathBuf>,
    cache_enabled: bool,
    constructor: Option<ContainerConstructor>,
}

impl SourceContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another container as fallback for unknown entries
    pub fn wrap_container(mut self, container: Arc<dyn ContainerRead>) -> Self {
        self.wrapped = Some(container);
        self
    }

    /// Append one definition source; sources load in the order they are added
    pub fn add_definitions(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Declare that resolving `key` asks the wrapped container for `target`
    pub fn add_import(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.imports.insert(key.into(), target.into());
        self
    }

    /// Registry backing the callable-by-name factory shape
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Replace the container constructor
    pub fn with_constructor(mut self, constructor: ContainerConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Enable the compiled container form, storing artifacts under `path`
    pub fn enable_compilation(mut self, path: impl Into<PathBuf>) -> Self {
        self.compilation_path = Some(path.into());
        self
    }

    /// Memoize definition-source loads process-wide
    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.cache_enabled = enable;
        self
    }

    /// The function registry this builder carries
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Merge the sources and imports and construct the container
    pub fn build(&self) -> Arc<dyn BridgedContainer> {
        let definitions = self.merged_definitions();

        #[cfg(feature = "logging")]
        debug!(
            target: "container_bridge",
            entries = definitions.len(),
            sources = self.sources.len(),
            imports = self.imports.len(),
            compiled = self.compilation_path.is_some(),
            "Building source container"
        );

        let parts = ContainerParts {
            definitions,
            wrapped: self.wrapped.clone(),
            functions: self.functions.clone(),
        };

        match &self.constructor {
            Some(constructor) => constructor(parts),
            None if self.compilation_path.is_some() => Arc::new(CompiledSourceContainer::new(parts)),
            None => Arc::new(SourceContainer::new(parts)),
        }
    }

    fn merged_definitions(&self) -> Arc<DefinitionMap> {
        if let Some(path) = &self.compilation_path {
            if let Some(snapshot) = compiled_snapshot(path) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "container_bridge",
                    path = %path.display(),
                    "Reusing compiled definition snapshot"
                );
                return snapshot;
            }
        }

        let mut map = DefinitionMap::default();
        for source in &self.sources {
            for (name, declaration) in self.load_source(source).iter() {
                map.insert(name.clone(), declaration.clone());
            }
        }
        for (key, target) in &self.imports {
            map.insert(key.clone(), Declaration::reference(target.clone()));
        }

        let map = Arc::new(map);
        if let Some(path) = &self.compilation_path {
            store_compiled_snapshot(path, Arc::clone(&map));
        }
        map
    }

    fn load_source(&self, source: &Arc<dyn DefinitionSource>) -> Arc<Vec<(String, Declaration)>> {
        if !self.cache_enabled {
            return Arc::new(source.load());
        }
        if let Some(cached) = LOADED_DEFINITIONS.get(source.name()) {
            return Arc::clone(cached.value());
        }
        let loaded = Arc::new(source.load());
        LOADED_DEFINITIONS.insert(source.name().to_string(), Arc::clone(&loaded));
        loaded
    }
}
