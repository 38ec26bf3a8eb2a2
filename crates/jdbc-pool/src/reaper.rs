//! Idle connection reaping.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::lifecycle::ConnectionHandle;

/// Finds handles that have sat idle longer than the configured threshold.
///
/// The reaper only detaches stale handles from a registry; the caller closes
/// them outside the registry lock with
/// [`close_handles`](crate::lifecycle::close_handles).
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdleReaper {
    max_idle: Option<Duration>,
}

impl IdleReaper {
    /// `None` disables reaping entirely.
    pub(crate) fn new(max_idle: Option<Duration>) -> Self {
        Self { max_idle }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.max_idle.is_some()
    }

    /// Remove every handle idle for longer than the threshold as of `now`.
    ///
    /// Scans from the tail so in-place removal never skips an element.
    /// Returns the removed handles in scan order.
    pub(crate) fn reap(
        &self,
        registry: &mut VecDeque<ConnectionHandle>,
        now: Instant,
    ) -> Vec<ConnectionHandle> {
        let Some(max_idle) = self.max_idle else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        for i in (0..registry.len()).rev() {
            if registry[i].idle_longer_than(max_idle, now) {
                if let Some(handle) = registry.remove(i) {
                    tracing::debug!(
                        connection_id = %handle.id(),
                        max_idle_ms = max_idle.as_millis() as u64,
                        "evicting idle connection"
                    );
                    evicted.push(handle);
                }
            }
        }
        evicted
    }
}
