//! Connection and statement capabilities.

use std::time::Duration;

use crate::error::Result;

/// An open connection owned by the driver runtime.
///
/// Every call is blocking: implementations forward synchronously over the
/// bridge. Callers running on an async executor should move these calls onto
/// a blocking thread.
pub trait Connection: Send + Sync {
    /// Close the connection. Closing twice is not an error.
    fn close(&self) -> Result<()>;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> Result<bool>;

    /// Check with the server that the connection is still usable.
    fn is_valid(&self, timeout: Duration) -> Result<bool>;

    /// Whether the connection is in read-only mode.
    fn is_read_only(&self) -> Result<bool>;

    /// Create a statement for executing ad-hoc SQL.
    fn create_statement(&self) -> Result<Box<dyn Statement>>;
}

/// A statement executor bound to a connection.
pub trait Statement: Send {
    /// Execute a SQL string.
    ///
    /// Returns `true` if the first result is a result set.
    fn execute(&mut self, sql: &str) -> Result<bool>;
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
