//! Connection creation.

use std::sync::Arc;

use jdbc_bridge::{ConnectArgs, Connection, DriverError, DriverManager, Properties};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::{CreationMode, PoolConfig};
use crate::error::PoolError;
use crate::keepalive::KeepaliveScheduler;
use crate::lifecycle::ConnectionHandle;
use crate::metrics::MetricsRecorder;

/// Opens connections for the pool and wraps them in handles.
#[derive(Debug)]
pub(crate) struct ConnectionFactory {
    manager: DriverManager,
    config: Arc<PoolConfig>,
    keepalive: KeepaliveScheduler,
    metrics: Arc<MetricsRecorder>,
}

impl ConnectionFactory {
    pub(crate) fn new(
        manager: DriverManager,
        config: Arc<PoolConfig>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let keepalive = KeepaliveScheduler::new(config.keepalive.clone(), Arc::clone(&metrics));
        Self {
            manager,
            config,
            keepalive,
            metrics,
        }
    }

    pub(crate) fn manager(&self) -> &DriverManager {
        &self.manager
    }

    /// Open one connection and start its keepalive, if enabled.
    ///
    /// If the returned future is dropped before the driver call finishes, the
    /// blocking thread closes the connection it opened.
    pub(crate) async fn create(&self) -> Result<ConnectionHandle, PoolError> {
        let manager = self.manager.clone();
        let config = Arc::clone(&self.config);
        let metrics = Arc::clone(&self.metrics);
        let (tx, rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            if let Err(Ok(orphan)) = tx.send(connect(&manager, &config)) {
                close_orphan(&*orphan, &metrics);
            }
        });

        let connection = rx
            .await
            .map_err(|e| PoolError::Task(format!("connect task receive error: {e}")))??;
        let connection: Arc<dyn Connection> = Arc::from(connection);

        let id = Uuid::new_v4();
        let keepalive = self.keepalive.schedule(id, Arc::clone(&connection));
        let handle = ConnectionHandle::new(
            id,
            connection,
            self.config.effective_max_idle().is_some(),
            keepalive,
        );

        self.metrics.connection_created();
        tracing::debug!(connection_id = %id, "connection created");
        Ok(handle)
    }
}

/// Open a connection through whichever path the configuration selects.
///
/// Blocking.
fn connect(manager: &DriverManager, config: &PoolConfig) -> Result<Box<dyn Connection>, DriverError> {
    match &config.mode {
        CreationMode::DataSource { class_name } => {
            let mut source = manager.runtime().new_data_source(class_name)?;
            source.set_url(&config.url)?;
            if let Some(user) = config.user.as_deref().filter(|u| !u.is_empty()) {
                source.set_user(user)?;
            }
            if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
                source.set_password(password)?;
            }
            source.get_connection()
        }
        CreationMode::DriverManager { .. } => manager.get_connection(
            &config.url,
            &ConnectArgs::Properties(connect_properties(config)),
        ),
    }
}

/// Close a connection nobody is waiting for any more.
///
/// Blocking.
fn close_orphan(connection: &dyn Connection, metrics: &MetricsRecorder) {
    metrics.connection_created();
    match connection.close() {
        Ok(()) => {
            metrics.connection_closed(true);
            tracing::debug!("closed connection opened for a cancelled request");
        }
        Err(e) => {
            metrics.connection_closed(false);
            tracing::warn!(
                error = %e,
                "failed to close connection opened for a cancelled request"
            );
        }
    }
}

/// Extra properties plus credentials, without overwriting explicit entries.
pub(crate) fn connect_properties(config: &PoolConfig) -> Properties {
    let mut props = config.properties.clone();
    if let Some(user) = config.user.as_deref().filter(|u| !u.is_empty()) {
        props.set_if_absent("user", user);
    }
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        props.set_if_absent("password", password);
    }
    props
}
