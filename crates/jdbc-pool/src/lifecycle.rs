//! Pooled connection handles and their lifecycle.
//!
//! A handle moves `Available -> Reserved -> Available -> ...` until it is
//! closed by idle reaping or by a purge. `Closed` is terminal.

use std::sync::Arc;
use std::time::Instant;

use jdbc_bridge::Connection;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::keepalive::KeepaliveTask;
use crate::metrics::MetricsRecorder;

/// Where a handle currently sits in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting in the available registry.
    Available,
    /// Loaned out to a caller.
    Reserved,
    /// Connection closed and dropped from the pool.
    Closed,
}

impl ConnectionState {
    /// Check if the handle can still be used.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// The pool's unit of tracking: a connection plus its management metadata.
///
/// Cloning is cheap and every clone refers to the same tracked connection.
/// A handle returned by [`Pool::reserve`](crate::Pool::reserve) is a loan and
/// must be given back with [`Pool::release`](crate::Pool::release).
///
/// Each reservation is a new loan. Clones share the loan of the handle they
/// were made from, so once the connection has been released and reserved
/// again, clones kept from the earlier loan are no longer accepted.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
    /// Loan this handle was issued under, 0 if it was never loaned.
    loan: u64,
}

struct HandleInner {
    id: Uuid,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    meta: Mutex<HandleMeta>,
}

struct HandleMeta {
    state: ConnectionState,
    /// `None` while idle tracking is off.
    last_idle_at: Option<Instant>,
    keepalive: Option<KeepaliveTask>,
    /// Number of loans issued so far.
    loans: u64,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: Uuid,
        connection: Arc<dyn Connection>,
        track_idle: bool,
        keepalive: Option<KeepaliveTask>,
    ) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(HandleInner {
                id,
                connection,
                created_at: now,
                meta: Mutex::new(HandleMeta {
                    state: ConnectionState::Available,
                    last_idle_at: track_idle.then_some(now),
                    keepalive,
                    loans: 0,
                }),
            }),
            loan: 0,
        }
    }

    /// Process-unique identifier, stable for the handle's lifetime.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.meta.lock().state
    }

    /// When the handle last entered the available registry or was reserved.
    ///
    /// `None` when idle eviction is disabled for the pool.
    #[must_use]
    pub fn last_idle_at(&self) -> Option<Instant> {
        self.inner.meta.lock().last_idle_at
    }

    /// When the connection was opened.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Whether a keepalive task is running for this connection.
    #[must_use]
    pub fn has_keepalive(&self) -> bool {
        self.inner
            .meta
            .lock()
            .keepalive
            .as_ref()
            .is_some_and(KeepaliveTask::is_running)
    }

    /// Move to `state`, refreshing the idle timestamp if tracking is on.
    pub(crate) fn mark(&self, state: ConnectionState, now: Instant) {
        let mut meta = self.inner.meta.lock();
        meta.state = state;
        if let Some(last) = meta.last_idle_at.as_mut() {
            *last = now;
        }
    }

    /// Start a new loan and return the handle that carries it.
    pub(crate) fn lend(&self, now: Instant) -> Self {
        let mut meta = self.inner.meta.lock();
        meta.state = ConnectionState::Reserved;
        if let Some(last) = meta.last_idle_at.as_mut() {
            *last = now;
        }
        meta.loans += 1;
        Self {
            inner: Arc::clone(&self.inner),
            loan: meta.loans,
        }
    }

    /// Whether the handle has been idle for longer than `max_idle` at `now`.
    pub(crate) fn idle_longer_than(&self, max_idle: std::time::Duration, now: Instant) -> bool {
        self.inner
            .meta
            .lock()
            .last_idle_at
            .is_some_and(|last| now.saturating_duration_since(last) > max_idle)
    }

    /// Mark closed and stop keepalive. Does not close the connection itself.
    ///
    /// Safe to call more than once.
    pub(crate) fn retire(&self) {
        let mut meta = self.inner.meta.lock();
        meta.state = ConnectionState::Closed;
        if let Some(mut task) = meta.keepalive.take() {
            task.cancel();
        }
    }

    /// Same connection and same loan.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.loan == other.loan
    }
}

/// Close every handle's connection, continuing past failures.
///
/// Blocking: call from a blocking thread. Each handle is retired before its
/// connection is closed, so a failed close still drops it from tracking.
/// Returns the number of close calls that failed.
pub(crate) fn close_handles(
    handles: &[ConnectionHandle],
    metrics: &MetricsRecorder,
    reason: &'static str,
) -> usize {
    let mut failures = 0;
    for handle in handles {
        handle.retire();
        match handle.connection().close() {
            Ok(()) => {
                metrics.connection_closed(true);
                tracing::debug!(connection_id = %handle.id(), reason, "connection closed");
            }
            Err(e) => {
                failures += 1;
                metrics.connection_closed(false);
                tracing::warn!(
                    connection_id = %handle.id(),
                    reason,
                    error = %e,
                    "failed to close connection"
                );
            }
        }
    }
    failures
}

/// Retire `handles` now and close them on a blocking thread without waiting.
///
/// For paths that cannot `.await`, such as `Drop`. Outside a runtime the
/// connections are closed inline.
pub(crate) fn close_in_background(
    handles: Vec<ConnectionHandle>,
    metrics: Arc<MetricsRecorder>,
    reason: &'static str,
) {
    if handles.is_empty() {
        return;
    }
    for handle in &handles {
        handle.retire();
    }
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(move || close_handles(&handles, &metrics, reason));
        }
        Err(_) => {
            close_handles(&handles, &metrics, reason);
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("loan", &self.loan)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use jdbc_bridge::{ConnectArgs, DriverRuntime};
    use jdbc_testing::MockRuntime;

    use super::*;

    fn handle(track_idle: bool) -> ConnectionHandle {
        let conn = MockRuntime::new()
            .get_connection("jdbc:mock:handle", &ConnectArgs::None)
            .unwrap();
        ConnectionHandle::new(Uuid::new_v4(), Arc::from(conn), track_idle, None)
    }

    #[test]
    fn test_idle_tracking_disabled() {
        let h = handle(false);
        assert_eq!(h.last_idle_at(), None);

        let later = Instant::now() + Duration::from_secs(3600);
        h.mark(ConnectionState::Reserved, later);
        assert_eq!(h.last_idle_at(), None);
        assert!(!h.idle_longer_than(Duration::from_millis(1), later));
    }

    #[test]
    fn test_mark_refreshes_idle_timestamp() {
        let h = handle(true);
        let created = h.last_idle_at().unwrap();

        let later = created + Duration::from_millis(500);
        assert!(h.idle_longer_than(Duration::from_millis(100), later));

        h.mark(ConnectionState::Reserved, later);
        assert_eq!(h.state(), ConnectionState::Reserved);
        assert_eq!(h.last_idle_at(), Some(later));
        assert!(!h.idle_longer_than(Duration::from_millis(100), later));
    }

    #[test]
    fn test_retire_is_idempotent() {
        let h = handle(true);
        let clone = h.clone();

        h.retire();
        h.retire();

        assert_eq!(clone.state(), ConnectionState::Closed);
        assert!(!clone.state().is_open());
        assert!(!clone.has_keepalive());
        assert!(clone.same_as(&h));
    }

    #[test]
    fn test_each_lend_is_a_new_loan() {
        let h = handle(true);
        let now = Instant::now();

        let first = h.lend(now);
        let kept = first.clone();
        assert!(kept.same_as(&first));
        assert_eq!(first.state(), ConnectionState::Reserved);

        first.mark(ConnectionState::Available, now);
        let second = h.lend(now);

        assert_eq!(second.id(), kept.id());
        assert!(!kept.same_as(&second));
        assert!(!h.same_as(&second));
    }

    #[test]
    fn test_close_handles_continues_past_failures() {
        let runtime = MockRuntime::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let conn = runtime
                    .get_connection("jdbc:mock:handle", &ConnectArgs::None)
                    .unwrap();
                ConnectionHandle::new(Uuid::new_v4(), Arc::from(conn), false, None)
            })
            .collect();
        runtime.connections()[1].set_fail_close(true);

        let metrics = MetricsRecorder::new();
        let failures = close_handles(&handles, &metrics, "test");

        assert_eq!(failures, 1);
        assert!(handles.iter().all(|h| h.state() == ConnectionState::Closed));
        let records = runtime.connections();
        assert!(records[0].is_closed());
        assert!(!records[1].is_closed());
        assert_eq!(records[1].close_calls(), 1);
        assert!(records[2].is_closed());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_closed, 2);
        assert_eq!(snapshot.close_failures, 1);
    }
}
