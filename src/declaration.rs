//! Declaration model for the convention-driven source container
//!
//! Every entry of the source container is described by a [`Declaration`],
//! a closed tagged union dispatched exhaustively by the bridge builder.

use crate::container::ContainerRead;
use crate::error::Result;
use crate::target::ContainerAware;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Parameter payloads
// =============================================================================

/// Plain data payload valid as a target-container parameter.
///
/// Only scalars, lists and string-keyed maps can cross the container boundary
/// as parameters; object instances cannot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(value: Vec<ParamValue>) -> Self {
        ParamValue::List(value)
    }
}

impl From<BTreeMap<String, ParamValue>> for ParamValue {
    fn from(value: BTreeMap<String, ParamValue>) -> Self {
        ParamValue::Map(value)
    }
}

// =============================================================================
// Resolved instances
// =============================================================================

/// A resolved service object, type-erased for storage.
///
/// The optional [`ContainerAware`] handle is captured at construction time;
/// it is how the bridge knows to inject the target container after
/// resolution without any runtime type probing.
#[derive(Clone)]
pub struct Instance {
    any: Arc<dyn Any + Send + Sync>,
    aware: Option<Arc<dyn ContainerAware>>,
}

impl Instance {
    /// Wrap a plain value
    #[inline]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value
    #[inline]
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            any: value,
            aware: None,
        }
    }

    /// Wrap a container-aware value, keeping its injection handle
    pub fn aware<T: ContainerAware + 'static>(value: T) -> Self {
        let shared = Arc::new(value);
        Self {
            any: Arc::clone(&shared) as Arc<dyn Any + Send + Sync>,
            aware: Some(shared as Arc<dyn ContainerAware>),
        }
    }

    /// Try to downcast to a concrete type
    #[inline]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.any).downcast::<T>().ok()
    }

    pub(crate) fn aware_handle(&self) -> Option<&Arc<dyn ContainerAware>> {
        self.aware.as_ref()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("container_aware", &self.aware.is_some())
            .finish()
    }
}

/// Outcome of a container lookup: either a service object or plain data
#[derive(Debug, Clone)]
pub enum Resolved {
    Instance(Instance),
    Value(ParamValue),
}

impl Resolved {
    /// Data payload, if this resolved to a parameter-style value
    #[inline]
    pub fn as_value(&self) -> Option<&ParamValue> {
        match self {
            Resolved::Value(value) => Some(value),
            Resolved::Instance(_) => None,
        }
    }

    /// Try to downcast an instance to a concrete type
    #[inline]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Resolved::Instance(instance) => instance.downcast::<T>(),
            Resolved::Value(_) => None,
        }
    }
}

/// Literal payload of a value declaration.
///
/// An `Instance` raw value is resolvable at runtime but is rejected when the
/// bridge tries to register it as a target-container parameter.
#[derive(Debug, Clone)]
pub enum RawValue {
    Param(ParamValue),
    Instance(Instance),
}

// =============================================================================
// Declarations
// =============================================================================

/// Per-entry scope applied by the source container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// Single instance, memoized per container build
    #[default]
    Singleton,

    /// New instance created on every resolve
    Transient,
}

/// Constructor for an object-backed entry, resolving dependencies through
/// the container it runs in
pub type ConstructFn = Arc<dyn Fn(&dyn ContainerRead) -> Result<Instance> + Send + Sync>;

/// Class-backed service declaration
#[derive(Clone)]
pub struct ObjectDeclaration {
    pub class: String,
    pub construct: ConstructFn,
    pub lifetime: Lifetime,
}

impl fmt::Debug for ObjectDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDeclaration")
            .field("class", &self.class)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Declaration produced by an arbitrary callable
#[derive(Clone)]
pub struct FactoryDeclaration {
    pub callable: crate::callable::Callable,
    pub lifetime: Lifetime,
}

impl fmt::Debug for FactoryDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDeclaration")
            .field("callable", &self.callable)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Alias to another entry, possibly chained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDeclaration {
    pub target: String,
}

/// Environment-variable-backed entry
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentDeclaration {
    pub variable: String,
    pub default: Option<ParamValue>,
}

/// Literal expression string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringDeclaration {
    pub expression: String,
}

/// Arbitrary literal value
#[derive(Debug, Clone)]
pub struct ValueDeclaration {
    pub value: RawValue,
}

/// Array of values, possibly holding nested array declarations
#[derive(Debug, Clone, Default)]
pub struct ArrayDeclaration {
    pub values: BTreeMap<String, ArrayItem>,
}

/// One slot of an [`ArrayDeclaration`]
#[derive(Debug, Clone)]
pub enum ArrayItem {
    Value(ParamValue),
    Nested(ArrayDeclaration),
}

impl ArrayDeclaration {
    /// Add one slot, consuming and returning the declaration
    pub fn with(mut self, key: impl Into<String>, item: ArrayItem) -> Self {
        self.values.insert(key.into(), item);
        self
    }

    /// Recursively unwrap nested array declarations into a plain map,
    /// preserving every key
    pub fn flatten(&self) -> ParamValue {
        let mut flat = BTreeMap::new();
        for (key, item) in &self.values {
            let value = match item {
                ArrayItem::Value(value) => value.clone(),
                ArrayItem::Nested(nested) => nested.flatten(),
            };
            flat.insert(key.clone(), value);
        }
        ParamValue::Map(flat)
    }
}

/// How one entry of the source container is produced
#[derive(Debug, Clone)]
pub enum Declaration {
    Object(ObjectDeclaration),
    Factory(FactoryDeclaration),
    Reference(ReferenceDeclaration),
    Environment(EnvironmentDeclaration),
    StringExpr(StringDeclaration),
    Value(ValueDeclaration),
    Array(ArrayDeclaration),
}

impl Declaration {
    /// Class-backed entry; the class name is taken from the Rust type
    pub fn object<T, F>(construct: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Self::object_with(std::any::type_name::<T>(), move |container| {
            Ok(Instance::new(construct(container)?))
        })
    }

    /// Class-backed entry whose value keeps its container-injection handle
    pub fn aware_object<T, F>(construct: F) -> Self
    where
        T: ContainerAware + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Self::object_with(std::any::type_name::<T>(), move |container| {
            Ok(Instance::aware(construct(container)?))
        })
    }

    /// Class-backed entry with an explicit class name and instance constructor
    pub fn object_with<F>(class: impl Into<String>, construct: F) -> Self
    where
        F: Fn(&dyn ContainerRead) -> Result<Instance> + Send + Sync + 'static,
    {
        Declaration::Object(ObjectDeclaration {
            class: class.into(),
            construct: Arc::new(construct),
            lifetime: Lifetime::Singleton,
        })
    }

    /// Entry produced by a factory callable
    pub fn factory(callable: crate::callable::Callable) -> Self {
        Declaration::Factory(FactoryDeclaration {
            callable,
            lifetime: Lifetime::Singleton,
        })
    }

    /// Alias to another entry
    pub fn reference(target: impl Into<String>) -> Self {
        Declaration::Reference(ReferenceDeclaration {
            target: target.into(),
        })
    }

    /// Environment variable without a default
    pub fn env(variable: impl Into<String>) -> Self {
        Declaration::Environment(EnvironmentDeclaration {
            variable: variable.into(),
            default: None,
        })
    }

    /// Environment variable with a default value
    pub fn env_with_default(variable: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        Declaration::Environment(EnvironmentDeclaration {
            variable: variable.into(),
            default: Some(default.into()),
        })
    }

    /// Literal expression string
    pub fn string_expr(expression: impl Into<String>) -> Self {
        Declaration::StringExpr(StringDeclaration {
            expression: expression.into(),
        })
    }

    /// Literal data value
    pub fn value(value: impl Into<ParamValue>) -> Self {
        Declaration::Value(ValueDeclaration {
            value: RawValue::Param(value.into()),
        })
    }

    /// Literal object instance; valid at runtime, invalid as a parameter
    pub fn instance_value(instance: Instance) -> Self {
        Declaration::Value(ValueDeclaration {
            value: RawValue::Instance(instance),
        })
    }

    /// Array declaration
    pub fn array(values: ArrayDeclaration) -> Self {
        Declaration::Array(values)
    }

    /// Switch an object or factory declaration to transient scope.
    ///
    /// Has no effect on the other declaration kinds.
    pub fn transient(mut self) -> Self {
        match &mut self {
            Declaration::Object(object) => object.lifetime = Lifetime::Transient,
            Declaration::Factory(factory) => factory.lifetime = Lifetime::Transient,
            _ => {}
        }
        self
    }

    /// Short kind label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Declaration::Object(_) => "object",
            Declaration::Factory(_) => "factory",
            Declaration::Reference(_) => "reference",
            Declaration::Environment(_) => "environment",
            Declaration::StringExpr(_) => "string",
            Declaration::Value(_) => "value",
            Declaration::Array(_) => "array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget {
        size: u32,
    }

    #[test]
    fn test_instance_downcast_roundtrip() {
        let instance = Instance::new(Widget { size: 7 });
        let widget = instance.downcast::<Widget>().unwrap();
        assert_eq!(widget.size, 7);
        assert!(instance.downcast::<String>().is_none());
    }

    #[test]
    fn test_param_value_conversions() {
        assert_eq!(ParamValue::from("text"), ParamValue::Str("text".into()));
        assert_eq!(ParamValue::from(3), ParamValue::Int(3));
        assert_eq!(ParamValue::from(true), ParamValue::Bool(true));
    }

    #[test]
    fn test_array_flatten_preserves_keys_and_unwraps_nesting() {
        let nested = ArrayDeclaration::default().with(
            "key6",
            ArrayItem::Nested(
                ArrayDeclaration::default().with("key7", ArrayItem::Value("value4".into())),
            ),
        );
        let array = ArrayDeclaration::default()
            .with("key1", ArrayItem::Value("value1".into()))
            .with("key5", ArrayItem::Nested(nested));

        let ParamValue::Map(flat) = array.flatten() else {
            panic!("flatten must yield a map");
        };
        assert_eq!(flat["key1"], ParamValue::Str("value1".into()));
        let ParamValue::Map(level5) = &flat["key5"] else {
            panic!("nested declaration must flatten to a map");
        };
        let ParamValue::Map(level6) = &level5["key6"] else {
            panic!("deep declaration must flatten to a map");
        };
        assert_eq!(level6["key7"], ParamValue::Str("value4".into()));
    }

    #[test]
    fn test_transient_only_touches_service_kinds() {
        let object = Declaration::object::<Widget, _>(|_| Ok(Widget { size: 1 })).transient();
        let Declaration::Object(decl) = &object else {
            panic!("expected object declaration");
        };
        assert_eq!(decl.lifetime, Lifetime::Transient);

        let value = Declaration::value("v").transient();
        assert_eq!(value.kind(), "value");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Declaration::reference("other").kind(), "reference");
        assert_eq!(Declaration::env("HOME").kind(), "environment");
        assert_eq!(Declaration::string_expr("a.b").kind(), "string");
    }
}
