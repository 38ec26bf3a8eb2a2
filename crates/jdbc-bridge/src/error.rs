//! Driver runtime error types.

use thiserror::Error;

/// Errors raised by the driver runtime or its bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DriverError {
    /// The requested driver or data source class could not be loaded.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// A driver instance could not be registered with the runtime.
    #[error("failed to register driver {class}: {message}")]
    Registration {
        /// Driver class name.
        class: String,
        /// Underlying failure.
        message: String,
    },

    /// Opening a connection failed (bad URL, authentication, unreachable host).
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Connection URL that was attempted.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// Arguments passed to a runtime entry point have an invalid shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The connection or statement has already been closed.
    #[error("connection closed")]
    Closed,

    /// The runtime does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Any other failure reported by the bridge.
    #[error("bridge error: {0}")]
    Bridge(String),
}

impl DriverError {
    /// Build a connect error for the given URL.
    pub fn connect(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Build a registration error for the given driver class.
    pub fn registration(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registration {
            class: class.into(),
            message: message.into(),
        }
    }
}

/// Result alias for driver runtime operations.
pub type Result<T> = std::result::Result<T, DriverError>;
