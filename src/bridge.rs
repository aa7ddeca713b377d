//! Runtime resolver standing between the two containers
//!
//! Registered into the target container as the factory behind every bridged
//! service definition. On first access it builds its own private source
//! container, wrapping itself as the fallback, so cross-references written
//! against either container resolve against the fully assembled target.

use crate::container::{BridgedContainer, ContainerRead};
use crate::declaration::Resolved;
use crate::error::{BridgeError, Result};
use crate::source::{DefinitionSource, SourceContainerBuilder};
use crate::target::TargetContainer;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Everything the resolver needs to rebuild the source container at runtime:
/// a builder prototype, the ordered definition sources, the import map and
/// the compilation/cache toggles recorded during translation
#[derive(Clone)]
pub struct BridgeSpec {
    pub builder: SourceContainerBuilder,
    pub sources: Vec<Arc<dyn DefinitionSource>>,
    pub imports: BTreeMap<String, String>,
    pub compilation_path: Option<PathBuf>,
    pub cache_enabled: bool,
}

/// The runtime resolver.
///
/// Performs no work at construction time. The private source container is
/// built at most once per resolver instance; the memoization is a plain
/// [`OnceCell`] because one resolver instance is never shared across
/// concurrent execution contexts (single request per process model).
pub struct Bridge {
    spec: BridgeSpec,
    target: Weak<TargetContainer>,
    self_ref: Weak<Bridge>,
    container: OnceCell<Arc<dyn BridgedContainer>>,
}

impl Bridge {
    pub(crate) fn new(spec: BridgeSpec, target: Weak<TargetContainer>, self_ref: Weak<Bridge>) -> Self {
        Self {
            spec,
            target,
            self_ref,
            container: OnceCell::new(),
        }
    }

    /// The private source container, built on first access
    fn container(&self) -> Result<&Arc<dyn BridgedContainer>> {
        self.container.get_or_try_init(|| {
            let me = self.self_ref.upgrade().ok_or(BridgeError::ContainerDropped)?;

            #[cfg(feature = "logging")]
            debug!(
                target: "container_bridge",
                sources = self.spec.sources.len(),
                imports = self.spec.imports.len(),
                "Building resolution container on first bridge access"
            );

            let mut builder = self
                .spec
                .builder
                .clone()
                .wrap_container(me as Arc<dyn ContainerRead>)
                .enable_cache(self.spec.cache_enabled);
            if let Some(path) = &self.spec.compilation_path {
                builder = builder.enable_compilation(path);
            }
            for source in &self.spec.sources {
                builder = builder.add_definitions(Arc::clone(source));
            }
            for (key, target) in &self.spec.imports {
                builder = builder.add_import(key.clone(), target.clone());
            }
            Ok(builder.build())
        })
    }

    /// Factory entry point used by bridged service definitions.
    ///
    /// Resolves from the private source container only; a container-aware
    /// instance gets the target container attached before it is returned.
    pub fn resolve(&self, id: &str) -> Result<Resolved> {
        let container = self.container()?;
        if container.has(id) {
            let value = container.get(id)?;
            if let Resolved::Instance(instance) = &value {
                if let Some(aware) = instance.aware_handle() {
                    let target = self.target.upgrade().ok_or(BridgeError::ContainerDropped)?;
                    aware.attach_container(target);
                }
            }
            return Ok(value);
        }
        Err(BridgeError::not_found(id))
    }

    /// Generic lookup surface: target services, then the source container,
    /// then target parameters
    pub fn get(&self, id: &str) -> Result<Resolved> {
        let target = self.target.upgrade().ok_or(BridgeError::ContainerDropped)?;
        if target.has(id) {
            return target.get(id);
        }
        let container = self.container()?;
        if container.has(id) {
            return container.get(id);
        }
        if target.has_parameter(id) {
            #[cfg(feature = "logging")]
            trace!(
                target: "container_bridge",
                entry = id,
                "Serving bridged lookup from the parameter store"
            );
            return target.parameter(id).map(Resolved::Value);
        }
        Err(BridgeError::not_found(id))
    }

    /// Same three-tier check as [`Bridge::get`]; never errors
    pub fn has(&self, id: &str) -> bool {
        let Some(target) = self.target.upgrade() else {
            return false;
        };
        if target.has(id) {
            return true;
        }
        match self.container() {
            Ok(container) => container.has(id) || target.has_parameter(id),
            Err(_) => target.has_parameter(id),
        }
    }
}

impl ContainerRead for Bridge {
    fn get(&self, id: &str) -> Result<Resolved> {
        Bridge::get(self, id)
    }

    fn has(&self, id: &str) -> bool {
        Bridge::has(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{Declaration, ParamValue};
    use crate::source::StaticDefinitions;
    use crate::target::{Parameter, TargetContainerBuilder};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Sensor {
        id: u32,
    }

    struct CountingSource {
        name: String,
        loads: Arc<AtomicU32>,
        entries: Vec<(String, Declaration)>,
    }

    impl DefinitionSource for CountingSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn load(&self) -> Vec<(String, Declaration)> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.entries.clone()
        }
    }

    fn spec_with(sources: Vec<Arc<dyn DefinitionSource>>) -> BridgeSpec {
        BridgeSpec {
            builder: SourceContainerBuilder::new(),
            sources,
            imports: BTreeMap::new(),
            compilation_path: None,
            cache_enabled: false,
        }
    }

    #[test]
    fn test_lazy_build_happens_at_most_once() {
        let loads = Arc::new(AtomicU32::new(0));
        let source: Arc<dyn DefinitionSource> = Arc::new(CountingSource {
            name: "bridge-lazy-once".to_string(),
            loads: Arc::clone(&loads),
            entries: vec![(
                "sensor".to_string(),
                Declaration::object::<Sensor, _>(|_| Ok(Sensor { id: 1 })),
            )],
        });

        let mut builder = TargetContainerBuilder::new();
        builder.set_bridge(spec_with(vec![source]));
        let container = builder.build();
        let bridge = container.bridge().unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 0);
        bridge.resolve("sensor").unwrap();
        bridge.resolve("sensor").unwrap();
        assert!(bridge.has("sensor"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_prefers_target_services_over_source_entries() {
        let source: Arc<dyn DefinitionSource> = Arc::new(
            StaticDefinitions::new("bridge-tiers")
                .with("sensor", Declaration::object::<Sensor, _>(|_| Ok(Sensor { id: 2 })))
                .with("shadowed", Declaration::value("from-source")),
        );

        let mut builder = TargetContainerBuilder::new();
        builder.set_instance("shadowed", Sensor { id: 10 });
        builder.set_parameter("rate_limit", Parameter::Value(ParamValue::Int(40)));
        builder.set_bridge(spec_with(vec![source]));
        let container = builder.build();
        let bridge = container.bridge().unwrap();

        // target tier wins
        let shadowed = bridge.get("shadowed").unwrap().downcast::<Sensor>().unwrap();
        assert_eq!(shadowed.id, 10);

        // source tier
        let sensor = bridge.get("sensor").unwrap().downcast::<Sensor>().unwrap();
        assert_eq!(sensor.id, 2);

        // parameter tier
        assert_eq!(
            bridge.get("rate_limit").unwrap().as_value(),
            Some(&ParamValue::Int(40))
        );
    }

    #[test]
    fn test_has_covers_all_tiers_and_never_errors() {
        let source: Arc<dyn DefinitionSource> = Arc::new(
            StaticDefinitions::new("bridge-has").with("entry", Declaration::value(1)),
        );

        let mut builder = TargetContainerBuilder::new();
        builder.set_instance("service", Sensor { id: 1 });
        builder.set_parameter("knob", Parameter::Value(ParamValue::Bool(true)));
        builder.set_bridge(spec_with(vec![source]));
        let container = builder.build();
        let bridge = container.bridge().unwrap();

        assert!(bridge.has("service"));
        assert!(bridge.has("entry"));
        assert!(bridge.has("knob"));
        assert!(!bridge.has("ghost"));
    }

    #[test]
    fn test_resolve_unknown_entry_is_not_found() {
        let mut builder = TargetContainerBuilder::new();
        builder.set_bridge(spec_with(Vec::new()));
        let container = builder.build();
        let bridge = container.bridge().unwrap();

        assert!(matches!(
            bridge.resolve("ghost").unwrap_err(),
            BridgeError::NotFound { .. }
        ));
    }
}
