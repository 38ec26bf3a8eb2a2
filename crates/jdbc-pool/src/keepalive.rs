//! Keepalive probes.
//!
//! Each pooled connection gets its own recurring task that executes a
//! trivial statement so the server does not drop the connection for
//! inactivity. A failed probe is logged and counted; the task keeps running
//! and the connection stays in the pool.

use std::sync::Arc;

use jdbc_bridge::{Connection, DriverError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::KeepaliveConfig;
use crate::metrics::MetricsRecorder;

/// Starts keepalive tasks for new connections.
#[derive(Debug)]
pub(crate) struct KeepaliveScheduler {
    config: KeepaliveConfig,
    metrics: Arc<MetricsRecorder>,
}

impl KeepaliveScheduler {
    pub(crate) fn new(config: KeepaliveConfig, metrics: Arc<MetricsRecorder>) -> Self {
        Self { config, metrics }
    }

    /// Start probing `connection`, or return `None` when keepalive is off.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn schedule(
        &self,
        connection_id: Uuid,
        connection: Arc<dyn Connection>,
    ) -> Option<KeepaliveTask> {
        if !self.config.enabled {
            return None;
        }

        let period = self.config.interval;
        let query = self.config.query.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            // First probe one full interval after creation.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let conn = Arc::clone(&connection);
                let sql = query.clone();
                match tokio::task::spawn_blocking(move || probe(conn.as_ref(), &sql)).await {
                    Ok(Ok(())) => {
                        metrics.keepalive_probe(true);
                        tracing::trace!(connection_id = %connection_id, "keepalive probe succeeded");
                    }
                    Ok(Err(e)) => {
                        metrics.keepalive_probe(false);
                        tracing::error!(
                            connection_id = %connection_id,
                            error = %e,
                            "keepalive probe failed"
                        );
                    }
                    Err(e) => {
                        metrics.keepalive_probe(false);
                        tracing::error!(
                            connection_id = %connection_id,
                            error = %e,
                            "keepalive probe task failed"
                        );
                    }
                }
            }
        });

        tracing::debug!(
            connection_id = %connection_id,
            interval_ms = period.as_millis() as u64,
            "keepalive scheduled"
        );

        Some(KeepaliveTask {
            handle: Some(handle),
        })
    }
}

fn probe(connection: &dyn Connection, query: &str) -> Result<(), DriverError> {
    let mut statement = connection.create_statement()?;
    statement.execute(query)?;
    Ok(())
}

/// A running keepalive task.
///
/// The task stops on [`cancel`](KeepaliveTask::cancel) or when this value is
/// dropped.
#[derive(Debug)]
pub struct KeepaliveTask {
    handle: Option<JoinHandle<()>>,
}

impl KeepaliveTask {
    /// Stop the task. Calling this more than once is a no-op.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the task has not been cancelled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for KeepaliveTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use jdbc_bridge::{ConnectArgs, DriverRuntime};
    use jdbc_testing::MockRuntime;

    use super::*;

    fn open(runtime: &MockRuntime) -> Arc<dyn Connection> {
        Arc::from(
            runtime
                .get_connection("jdbc:mock:keepalive", &ConnectArgs::None)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_disabled_schedules_nothing() {
        let runtime = MockRuntime::new();
        let scheduler =
            KeepaliveScheduler::new(KeepaliveConfig::default(), Arc::new(MetricsRecorder::new()));
        assert!(scheduler.schedule(Uuid::new_v4(), open(&runtime)).is_none());
    }

    #[tokio::test]
    async fn test_probes_until_cancelled() {
        let runtime = MockRuntime::new();
        let metrics = Arc::new(MetricsRecorder::new());
        let scheduler = KeepaliveScheduler::new(
            KeepaliveConfig::every(Duration::from_millis(20)).query("select 42"),
            Arc::clone(&metrics),
        );

        let mut task = scheduler.schedule(Uuid::new_v4(), open(&runtime)).unwrap();
        assert!(task.is_running());
        tokio::time::sleep(Duration::from_millis(110)).await;

        task.cancel();
        task.cancel();
        assert!(!task.is_running());

        let executed = runtime.connections()[0].executed();
        assert!(executed.len() >= 2, "expected repeated probes, got {executed:?}");
        assert!(executed.iter().all(|sql| sql == "select 42"));

        // Give an in-flight probe time to land, then make sure nothing new runs.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = runtime.connections()[0].executed().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runtime.connections()[0].executed().len(), settled);
        assert!(metrics.snapshot().keepalive_probes_performed >= 2);
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_running() {
        let runtime = MockRuntime::new().fail_probes();
        let metrics = Arc::new(MetricsRecorder::new());
        let scheduler = KeepaliveScheduler::new(
            KeepaliveConfig::every(Duration::from_millis(20)),
            Arc::clone(&metrics),
        );

        let task = scheduler.schedule(Uuid::new_v4(), open(&runtime)).unwrap();
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(task.is_running());

        let snapshot = metrics.snapshot();
        assert!(snapshot.keepalive_probes_failed >= 2);
        assert_eq!(
            snapshot.keepalive_probes_failed,
            snapshot.keepalive_probes_performed
        );
        assert!(!runtime.connections()[0].is_closed());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let runtime = MockRuntime::new();
        let scheduler = KeepaliveScheduler::new(
            KeepaliveConfig::every(Duration::from_millis(20)),
            Arc::new(MetricsRecorder::new()),
        );

        let task = scheduler.schedule(Uuid::new_v4(), open(&runtime)).unwrap();
        drop(task);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(runtime.connections()[0].executed().is_empty());
    }
}
