//! # jdbc-testing
//!
//! In-memory driver runtime for exercising the connection pool without a
//! JVM or a database.
//!
//! [`MockRuntime`] hands out [`MockConnection`]s and records everything the
//! pool does with them: connect calls, registered drivers, configured data
//! sources, statements executed, and close calls. Failures can be injected
//! per operation.
//!
//! ```rust,ignore
//! let runtime = MockRuntime::new();
//! let pool = Pool::new(config, Arc::new(runtime.clone()))?;
//! pool.initialize().await?;
//! assert_eq!(runtime.connections().len(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod runtime;

pub use runtime::{ConnectionRecord, DataSourceRecord, MockConnection, MockRuntime};
