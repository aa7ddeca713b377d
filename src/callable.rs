//! Factory callable shapes and their descriptors
//!
//! The source container accepts factories in four shapes: a closure, an
//! invokable object, an `(object, method name)` pair, and a function
//! registered by name. Each shape resolves to a descriptor that can report
//! the declared return type of the callable, which is what lets the bridge
//! pick a concrete class name for the target container without running the
//! factory.

use crate::container::ContainerRead;
use crate::declaration::{Instance, Resolved};
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared return type of a factory callable.
///
/// Translation requires a single named type; everything else aborts with
/// [`BridgeError::InvalidReturnType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Named(String),
    Union(Vec<String>),
    Untyped,
}

impl ReturnType {
    /// Named return type taken from a Rust type
    #[inline]
    pub fn named<T: ?Sized + 'static>() -> Self {
        ReturnType::Named(std::any::type_name::<T>().to_string())
    }

    /// Human-readable form for error messages
    pub fn describe(&self) -> String {
        match self {
            ReturnType::Named(name) => name.clone(),
            ReturnType::Union(names) => names.join(" | "),
            ReturnType::Untyped => "no declared type".to_string(),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Type-erased factory body, resolving dependencies through the container
/// it runs in
pub type FactoryFn = Arc<dyn Fn(&dyn ContainerRead) -> Result<Resolved> + Send + Sync>;

// =============================================================================
// Closure shape
// =============================================================================

/// A closure factory with its return type recorded at registration
#[derive(Clone)]
pub struct ClosureFactory {
    return_type: ReturnType,
    call: FactoryFn,
}

impl ClosureFactory {
    /// Typed closure; the return type is taken from `T`
    pub fn new<T, F>(call: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            return_type: ReturnType::named::<T>(),
            call: Arc::new(move |container| Ok(Resolved::Instance(Instance::new(call(container)?)))),
        }
    }

    /// Closure without a declared return type.
    ///
    /// Resolvable at runtime, but translation of the entry will fail.
    pub fn untyped<F>(call: F) -> Self
    where
        F: Fn(&dyn ContainerRead) -> Result<Resolved> + Send + Sync + 'static,
    {
        Self {
            return_type: ReturnType::Untyped,
            call: Arc::new(call),
        }
    }

    /// Override the recorded return type
    pub fn with_return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// The recorded return type
    #[inline]
    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }
}

// =============================================================================
// Invokable shape
// =============================================================================

/// An invokable factory object; the trait itself is the callable descriptor
pub trait InvokableFactory: Send + Sync {
    /// Declared return type of the invocation
    fn return_type(&self) -> ReturnType;

    /// Produce the entry value
    fn invoke(&self, container: &dyn ContainerRead) -> Result<Resolved>;
}

// =============================================================================
// Method-pair shape
// =============================================================================

/// Descriptor for one named method of a factory receiver
#[derive(Clone)]
pub struct MethodDescriptor {
    pub return_type: ReturnType,
    pub call: FactoryFn,
}

impl MethodDescriptor {
    /// Typed method descriptor; the return type is taken from `T`
    pub fn new<T, F>(call: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            return_type: ReturnType::named::<T>(),
            call: Arc::new(move |container| Ok(Resolved::Instance(Instance::new(call(container)?)))),
        }
    }
}

/// Receiver side of the `(object, method name)` callable shape.
///
/// Asking for an unknown method makes the callable unsupported.
pub trait MethodProvider: Send + Sync {
    fn method(&self, name: &str) -> Option<MethodDescriptor>;
}

// =============================================================================
// Named-function shape
// =============================================================================

/// A free function registered by name
#[derive(Clone)]
pub struct NamedFunction {
    pub return_type: ReturnType,
    pub call: FactoryFn,
}

impl NamedFunction {
    /// Typed function; the return type is taken from `T`
    pub fn new<T, F>(call: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            return_type: ReturnType::named::<T>(),
            call: Arc::new(move |container| Ok(Resolved::Instance(Instance::new(call(container)?)))),
        }
    }
}

/// Explicit registry backing the callable-by-name shape.
///
/// The registry travels with the source-container builder; there is no
/// process-wide function table.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NamedFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one function, replacing any previous one under the name
    pub fn register(&mut self, name: impl Into<String>, function: NamedFunction) -> &mut Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NamedFunction> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// =============================================================================
// The callable union
// =============================================================================

/// The four recognized factory-callable shapes
#[derive(Clone)]
pub enum Callable {
    /// Anonymous closure
    Closure(ClosureFactory),
    /// Invokable object
    Invokable(Arc<dyn InvokableFactory>),
    /// `(object, method name)` pair
    Method {
        receiver: Arc<dyn MethodProvider>,
        method: String,
    },
    /// Function registered by name
    Function(String),
}

impl Callable {
    /// Shorthand for a typed closure callable
    pub fn closure<T, F>(call: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ContainerRead) -> Result<T> + Send + Sync + 'static,
    {
        Callable::Closure(ClosureFactory::new(call))
    }

    /// Shorthand for the method-pair shape
    pub fn method(receiver: Arc<dyn MethodProvider>, method: impl Into<String>) -> Self {
        Callable::Method {
            receiver,
            method: method.into(),
        }
    }

    /// Resolve this callable to its return type and invocable body.
    ///
    /// Fails with [`BridgeError::InvalidFactoryCallable`] when the shape
    /// cannot be resolved: an unknown method on the receiver, or a function
    /// name missing from the registry.
    pub(crate) fn describe(
        &self,
        entry: &str,
        functions: &FunctionRegistry,
    ) -> Result<(ReturnType, FactoryFn)> {
        match self {
            Callable::Closure(closure) => {
                Ok((closure.return_type.clone(), Arc::clone(&closure.call)))
            }
            Callable::Invokable(invokable) => {
                let target = Arc::clone(invokable);
                Ok((
                    invokable.return_type(),
                    Arc::new(move |container| target.invoke(container)),
                ))
            }
            Callable::Method { receiver, method } => {
                let descriptor = receiver.method(method).ok_or_else(|| {
                    BridgeError::invalid_callable(
                        entry,
                        format!("no method `{method}` on the factory receiver"),
                    )
                })?;
                Ok((descriptor.return_type, descriptor.call))
            }
            Callable::Function(name) => {
                let function = functions.get(name).ok_or_else(|| {
                    BridgeError::invalid_callable(
                        entry,
                        format!("function `{name}` is not registered"),
                    )
                })?;
                Ok((function.return_type.clone(), Arc::clone(&function.call)))
            }
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Closure(closure) => f
                .debug_struct("Closure")
                .field("return_type", closure.return_type())
                .finish(),
            Callable::Invokable(invokable) => f
                .debug_struct("Invokable")
                .field("return_type", &invokable.return_type())
                .finish(),
            Callable::Method { method, .. } => {
                f.debug_struct("Method").field("method", method).finish()
            }
            Callable::Function(name) => f.debug_tuple("Function").field(name).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer;

    struct MailerMaker;

    impl InvokableFactory for MailerMaker {
        fn return_type(&self) -> ReturnType {
            ReturnType::named::<Mailer>()
        }

        fn invoke(&self, _container: &dyn ContainerRead) -> Result<Resolved> {
            Ok(Resolved::Instance(Instance::new(Mailer)))
        }
    }

    struct TransportFactory;

    impl MethodProvider for TransportFactory {
        fn method(&self, name: &str) -> Option<MethodDescriptor> {
            match name {
                "create" => Some(MethodDescriptor::new::<Mailer, _>(|_| Ok(Mailer))),
                _ => None,
            }
        }
    }

    fn registry_with_build() -> FunctionRegistry {
        let mut functions = FunctionRegistry::new();
        functions.register("build_mailer", NamedFunction::new::<Mailer, _>(|_| Ok(Mailer)));
        functions
    }

    #[test]
    fn test_closure_shape_reports_its_type() {
        let callable = Callable::closure::<Mailer, _>(|_| Ok(Mailer));
        let (return_type, _) = callable.describe("mailer", &FunctionRegistry::new()).unwrap();
        assert_eq!(return_type, ReturnType::named::<Mailer>());
    }

    #[test]
    fn test_invokable_shape_reports_its_type() {
        let callable = Callable::Invokable(Arc::new(MailerMaker));
        let (return_type, _) = callable.describe("mailer", &FunctionRegistry::new()).unwrap();
        assert_eq!(return_type, ReturnType::named::<Mailer>());
    }

    #[test]
    fn test_method_shape_resolves_known_method() {
        let callable = Callable::method(Arc::new(TransportFactory), "create");
        let (return_type, call) = callable.describe("mailer", &FunctionRegistry::new()).unwrap();
        assert_eq!(return_type, ReturnType::named::<Mailer>());

        let registry = registry_with_build();
        let container = crate::source::SourceContainerBuilder::new()
            .with_functions(registry)
            .build();
        let resolved = call(container.as_read()).unwrap();
        assert!(resolved.downcast::<Mailer>().is_some());
    }

    #[test]
    fn test_method_shape_rejects_unknown_method() {
        let callable = Callable::method(Arc::new(TransportFactory), "make");
        let err = match callable.describe("mailer", &FunctionRegistry::new()) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, BridgeError::InvalidFactoryCallable { .. }));
    }

    #[test]
    fn test_function_shape_resolves_through_registry() {
        let callable = Callable::Function("build_mailer".into());
        let (return_type, _) = callable.describe("mailer", &registry_with_build()).unwrap();
        assert_eq!(return_type, ReturnType::named::<Mailer>());
    }

    #[test]
    fn test_function_shape_rejects_unregistered_name() {
        let callable = Callable::Function("missing".into());
        let err = match callable.describe("mailer", &FunctionRegistry::new()) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, BridgeError::InvalidFactoryCallable { .. }));
    }

    #[test]
    fn test_untyped_closure_is_resolvable_but_untyped() {
        let closure =
            ClosureFactory::untyped(|_| Ok(Resolved::Instance(Instance::new(Mailer))));
        assert_eq!(closure.return_type(), &ReturnType::Untyped);
    }
}
