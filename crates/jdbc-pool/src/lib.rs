//! # jdbc-driver-pool
//!
//! Connection pool for drivers reached through a [`DriverRuntime`]
//! (a JVM bridge, a vendor library, or an in-memory test double).
//!
//! The pool manages a bounded set of expensive, stateful connections:
//!
//! - Eager creation of `min_pool_size` connections on `initialize`
//! - Lazy growth up to `max_pool_size` on `reserve`, with no waiting
//! - Idle reaping of connections unused for longer than `max_idle`
//! - Per-connection keepalive probes against server-side idle timeouts
//! - Live status probes and bulk purge
//! - Metrics for observability
//!
//! Idle reaping and keepalive are mutually exclusive: enabling keepalive
//! turns idle tracking off.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use jdbc_driver_pool::{KeepaliveConfig, Pool};
//!
//! let pool = Pool::builder()
//!     .url("jdbc:h2:tcp://localhost/app")
//!     .driver_class("org.h2.Driver")
//!     .user("sa")
//!     .min_pool_size(2)
//!     .max_pool_size(10)
//!     .keepalive(KeepaliveConfig::every(Duration::from_secs(60)))
//!     .runtime(Arc::new(runtime))
//!     .build()?;
//!
//! pool.initialize().await?;
//!
//! let handle = pool.reserve().await?;
//! // Use handle.connection()...
//! pool.release(handle)?;
//!
//! let status = pool.status().await?;
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! pool.purge().await;
//! ```
//!
//! [`DriverRuntime`]: jdbc_bridge::DriverRuntime

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod keepalive;
pub mod lifecycle;
pub mod metrics;
pub mod pool;

mod factory;
mod reaper;

// Configuration
pub use config::{CreationMode, KeepaliveConfig, PoolConfig};

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{ConnectionStatus, Pool, PoolBuilder, PoolStatus};

// Lifecycle management
pub use keepalive::KeepaliveTask;
pub use lifecycle::{ConnectionHandle, ConnectionState};
pub use metrics::PoolMetrics;
