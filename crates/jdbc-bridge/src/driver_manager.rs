//! Driver-manager facade over a [`DriverRuntime`].

use std::sync::Arc;

use crate::connection::Connection;
use crate::driver::{ConnectArgs, DriverRuntime};
use crate::error::{DriverError, Result};

/// Validating front door to the runtime's driver registry.
#[derive(Clone)]
pub struct DriverManager {
    runtime: Arc<dyn DriverRuntime>,
}

impl DriverManager {
    /// Wrap a runtime.
    pub fn new(runtime: Arc<dyn DriverRuntime>) -> Self {
        Self { runtime }
    }

    /// The wrapped runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn DriverRuntime> {
        &self.runtime
    }

    /// Instantiate a driver class and register it.
    pub fn register_driver(&self, class_name: &str) -> Result<()> {
        if class_name.trim().is_empty() {
            return Err(DriverError::InvalidArguments(
                "driver class name cannot be empty".into(),
            ));
        }

        let driver = self.runtime.new_driver(class_name)?;
        self.runtime.register_driver(driver)?;

        tracing::debug!(driver = class_name, "registered driver");
        Ok(())
    }

    /// Open a connection after checking the argument shape.
    pub fn get_connection(&self, url: &str, args: &ConnectArgs) -> Result<Box<dyn Connection>> {
        validate_args(url, args)?;
        self.runtime.get_connection(url, args)
    }

    /// Current login timeout in seconds.
    pub fn login_timeout(&self) -> Result<u32> {
        self.runtime.login_timeout()
    }

    /// Set the login timeout in seconds.
    pub fn set_login_timeout(&self, seconds: u32) -> Result<()> {
        self.runtime.set_login_timeout(seconds)
    }
}

impl std::fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverManager").finish_non_exhaustive()
    }
}

fn validate_args(url: &str, args: &ConnectArgs) -> Result<()> {
    if url.trim().is_empty() {
        return Err(DriverError::InvalidArguments(
            "connection url cannot be empty".into(),
        ));
    }

    if let ConnectArgs::Credentials { user, password } = args {
        if user.is_empty() && !password.is_empty() {
            return Err(DriverError::InvalidArguments(
                "password given without a user".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args() {
        assert!(validate_args("jdbc:sqlite:test.db", &ConnectArgs::None).is_ok());
        assert!(validate_args("jdbc:sqlite:test.db", &ConnectArgs::credentials("sa", "")).is_ok());
        assert!(validate_args("", &ConnectArgs::None).is_err());
        assert!(validate_args("   ", &ConnectArgs::None).is_err());
        assert!(
            validate_args("jdbc:sqlite:test.db", &ConnectArgs::credentials("", "secret")).is_err()
        );
    }
}
