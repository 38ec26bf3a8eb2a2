//! Driver runtime entry points.

use crate::connection::Connection;
use crate::error::Result;
use crate::properties::Properties;

/// Argument shapes accepted by the driver-manager connect call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectArgs {
    /// URL only; credentials, if any, are embedded in the URL.
    #[default]
    None,
    /// Explicit user and password.
    Credentials {
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
    /// A property bag that may carry `user`/`password` among other keys.
    Properties(Properties),
}

impl ConnectArgs {
    /// Shorthand for [`ConnectArgs::Credentials`].
    pub fn credentials(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Credentials {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// A driver instance created by the runtime, ready to be registered.
pub trait Driver: Send {
    /// Fully qualified class name of the driver.
    fn class_name(&self) -> &str;
}

/// A vendor data source, configured through setters before connecting.
pub trait DataSource: Send {
    /// Set the connection URL.
    fn set_url(&mut self, url: &str) -> Result<()>;

    /// Set the user name.
    ///
    /// Data sources without a user setter accept and ignore the call.
    fn set_user(&mut self, _user: &str) -> Result<()> {
        Ok(())
    }

    /// Set the password.
    ///
    /// Data sources without a password setter accept and ignore the call.
    fn set_password(&mut self, _password: &str) -> Result<()> {
        Ok(())
    }

    /// Open a connection using the configured settings.
    fn get_connection(&self) -> Result<Box<dyn Connection>>;
}

/// The external database-access runtime.
///
/// Passed into the pool explicitly rather than reached through a
/// process-wide singleton, so each pool can be given its own runtime.
pub trait DriverRuntime: Send + Sync {
    /// Instantiate a driver class.
    fn new_driver(&self, class_name: &str) -> Result<Box<dyn Driver>>;

    /// Register a driver instance with the runtime's driver registry.
    fn register_driver(&self, driver: Box<dyn Driver>) -> Result<()>;

    /// Open a connection through the driver registry.
    ///
    /// Argument shapes are validated by [`DriverManager`](crate::DriverManager)
    /// before this is called.
    fn get_connection(&self, url: &str, args: &ConnectArgs) -> Result<Box<dyn Connection>>;

    /// Instantiate a vendor data source class.
    fn new_data_source(&self, class_name: &str) -> Result<Box<dyn DataSource>>;

    /// Login timeout in seconds applied to new connections.
    fn login_timeout(&self) -> Result<u32> {
        Ok(0)
    }

    /// Set the login timeout in seconds.
    fn set_login_timeout(&self, _seconds: u32) -> Result<()> {
        Err(crate::DriverError::Unsupported("set_login_timeout".into()))
    }
}
