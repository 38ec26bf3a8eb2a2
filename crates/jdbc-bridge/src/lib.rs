//! # jdbc-bridge
//!
//! Contracts between the connection pool and the external database-access
//! runtime it drives.
//!
//! The runtime itself (a JVM reached through a foreign-function bridge, a
//! vendor driver, or an in-memory double in tests) lives outside this crate.
//! This crate only names the capabilities the pool relies on:
//!
//! - [`DriverRuntime`]: the injected entry point that registers drivers,
//!   opens connections and builds vendor data sources
//! - [`Connection`]: an opaque, blocking connection capability
//! - [`Statement`]: a statement executor used for keepalive probes
//! - [`DataSource`]: a vendor data source configured through setters
//!
//! [`DriverManager`] wraps a runtime and validates connect arguments before
//! forwarding them, mirroring the classic driver-manager entry point.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jdbc_bridge::{ConnectArgs, DriverManager};
//!
//! let manager = DriverManager::new(Arc::new(runtime));
//! manager.register_driver("org.sqlite.JDBC")?;
//!
//! let conn = manager.get_connection(
//!     "jdbc:sqlite:sample.db",
//!     &ConnectArgs::credentials("SA", ""),
//! )?;
//! assert!(!conn.is_closed()?);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod driver;
pub mod driver_manager;
pub mod error;
pub mod properties;

pub use connection::{Connection, Statement};
pub use driver::{ConnectArgs, DataSource, Driver, DriverRuntime};
pub use driver_manager::DriverManager;
pub use error::{DriverError, Result};
pub use properties::Properties;
