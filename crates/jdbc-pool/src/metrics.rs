//! Pool metrics.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Counters shared by the pool and its keepalive tasks.
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    created_at: Instant,
    counters: Mutex<Counters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    connections_created: u64,
    connections_closed: u64,
    close_failures: u64,
    reservations_successful: u64,
    reservations_failed: u64,
    idle_evictions: u64,
    keepalive_probes_performed: u64,
    keepalive_probes_failed: u64,
}

impl MetricsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            created_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub(crate) fn connection_created(&self) {
        self.counters.lock().connections_created += 1;
    }

    pub(crate) fn connection_closed(&self, ok: bool) {
        let mut counters = self.counters.lock();
        if ok {
            counters.connections_closed += 1;
        } else {
            counters.close_failures += 1;
        }
    }

    pub(crate) fn reservation(&self, ok: bool) {
        let mut counters = self.counters.lock();
        if ok {
            counters.reservations_successful += 1;
        } else {
            counters.reservations_failed += 1;
        }
    }

    pub(crate) fn idle_evicted(&self, count: usize) {
        self.counters.lock().idle_evictions += count as u64;
    }

    pub(crate) fn keepalive_probe(&self, ok: bool) {
        let mut counters = self.counters.lock();
        counters.keepalive_probes_performed += 1;
        if !ok {
            counters.keepalive_probes_failed += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        let c = *self.counters.lock();
        PoolMetrics {
            connections_created: c.connections_created,
            connections_closed: c.connections_closed,
            close_failures: c.close_failures,
            reservations_successful: c.reservations_successful,
            reservations_failed: c.reservations_failed,
            idle_evictions: c.idle_evictions,
            keepalive_probes_performed: c.keepalive_probes_performed,
            keepalive_probes_failed: c.keepalive_probes_failed,
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Connections closed without error.
    pub connections_closed: u64,
    /// Close calls that failed; the connection was dropped from the pool anyway.
    pub close_failures: u64,
    /// Successful reservations.
    pub reservations_successful: u64,
    /// Failed reservations (exhaustion or connection errors).
    pub reservations_failed: u64,
    /// Connections closed by idle reaping.
    pub idle_evictions: u64,
    /// Keepalive probes executed.
    pub keepalive_probes_performed: u64,
    /// Keepalive probes that failed.
    pub keepalive_probes_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate reservation success rate (0.0 to 1.0).
    #[must_use]
    pub fn reservation_success_rate(&self) -> f64 {
        let total = self.reservations_successful + self.reservations_failed;
        if total == 0 {
            return 1.0;
        }
        self.reservations_successful as f64 / total as f64
    }

    /// Calculate keepalive probe success rate (0.0 to 1.0).
    #[must_use]
    pub fn keepalive_success_rate(&self) -> f64 {
        if self.keepalive_probes_performed == 0 {
            return 1.0;
        }
        let successful = self.keepalive_probes_performed - self.keepalive_probes_failed;
        successful as f64 / self.keepalive_probes_performed as f64
    }
}
