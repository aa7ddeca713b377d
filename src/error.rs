//! Error types for the container bridge

use thiserror::Error;

/// Errors raised while translating declarations or resolving bridged entries
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Identifier exists in neither container nor the parameter store
    #[error("service `{id}` was not found in either container")]
    NotFound { id: String },

    /// A factory declaration's callable is not one of the recognized shapes
    #[error("factory callable for `{entry}` is not supported: {reason}")]
    InvalidFactoryCallable { entry: String, reason: String },

    /// A factory declaration's callable has no single named return type
    #[error("factory for `{entry}` must declare a single named return type, found {found}")]
    InvalidReturnType { entry: String, found: String },

    /// A value declaration wraps an object, which cannot become a parameter
    #[error("value declaration `{entry}` holds an object instance and cannot be registered as a parameter")]
    InvalidParameterValue { entry: String },

    /// A configured hook could not be resolved to an extension instance
    #[error("extension `{name}` is neither a registered instance nor a registered factory")]
    InvalidExtension { name: String },

    /// The built discovery container does not satisfy the bridge contract
    #[error("invalid container built for the bridge: {0}")]
    InvalidContainer(String),

    /// The target container behind the bridge has been dropped
    #[error("target container has been dropped")]
    ContainerDropped,

    /// A construct or factory callable failed at resolution time
    #[error("failed to create entry `{entry}`: {reason}")]
    CreationFailed { entry: String, reason: String },
}

impl BridgeError {
    /// Create a NotFound error for an entry identifier
    #[inline]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an InvalidFactoryCallable error
    #[inline]
    pub fn invalid_callable(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFactoryCallable {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
