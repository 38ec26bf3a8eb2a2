//! Pool error types.

use jdbc_bridge::DriverError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool configuration is invalid or contradictory.
    ///
    /// Detected before any connection is attempted.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// Driver registration or connection creation failed.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Every slot up to the maximum pool size is taken.
    #[error("no more pool connections available (max {max})")]
    Exhausted {
        /// Maximum pool size.
        max: u32,
    },

    /// The handle is not currently reserved from this pool.
    #[error("connection {id} is not reserved from this pool")]
    InvalidHandle {
        /// Identifier of the rejected handle.
        id: Uuid,
    },

    /// `initialize` was called on a pool that is already initialized.
    #[error("pool is already initialized")]
    AlreadyInitialized,

    /// `initialize` was called while another `initialize` is still running.
    #[error("pool initialization is already in progress")]
    Initializing,

    /// A blocking driver call panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl PoolError {
    /// Check if the caller may succeed by trying again later.
    ///
    /// Only exhaustion qualifies; the pool never retries or queues on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl From<tokio::task::JoinError> for PoolError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message() {
        let err = PoolError::Exhausted { max: 2 };
        assert_eq!(
            err.to_string(),
            "no more pool connections available (max 2)"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_driver_error_conversion() {
        let err: PoolError = DriverError::connect("jdbc:h2:mem:", "refused").into();
        assert!(matches!(err, PoolError::Driver(DriverError::Connect { .. })));
        assert!(!err.is_transient());
    }
}
