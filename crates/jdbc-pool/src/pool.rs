//! Connection pool implementation.
//!
//! The pool keeps two registries: `available` handles waiting to be reserved
//! and `reserved` handles loaned out to callers. Both live under one mutex
//! that is never held across an `.await`, so every registry transition is
//! atomic with respect to other pool calls.
//!
//! Growth uses a claim-then-create protocol: a capacity slot is claimed
//! under the lock before the connection is opened and given back if opening
//! fails or the caller stops waiting. Concurrent reservations therefore can
//! never push the pool past its maximum size.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use jdbc_bridge::{DriverManager, DriverRuntime};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::{CreationMode, KeepaliveConfig, PoolConfig};
use crate::error::PoolError;
use crate::factory::ConnectionFactory;
use crate::lifecycle::{ConnectionHandle, ConnectionState, close_handles, close_in_background};
use crate::metrics::{MetricsRecorder, PoolMetrics};
use crate::reaper::IdleReaper;

/// A pool of connections opened through a [`DriverRuntime`].
///
/// # Example
///
/// ```rust,ignore
/// use jdbc_driver_pool::{Pool, PoolConfig};
///
/// let config = PoolConfig::new("jdbc:h2:mem:app")
///     .min_pool_size(2)
///     .max_pool_size(8);
///
/// let pool = Pool::new(config, runtime)?;
/// pool.initialize().await?;
///
/// let handle = pool.reserve().await?;
/// // Use handle.connection()...
/// pool.release(handle)?;
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: Arc<PoolConfig>,
    factory: ConnectionFactory,
    reaper: IdleReaper,
    registries: Mutex<Registries>,
    init: AtomicU8,
    metrics: Arc<MetricsRecorder>,
}

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const INITIALIZED: u8 = 2;

/// Marks an `initialize` call in progress.
///
/// Dropping it without committing, on failure or cancellation, puts the pool
/// back to uninitialized.
struct InitGuard<'a> {
    state: &'a AtomicU8,
    done: bool,
}

impl<'a> InitGuard<'a> {
    fn begin(state: &'a AtomicU8) -> Result<Self, PoolError> {
        match state.compare_exchange(
            UNINITIALIZED,
            INITIALIZING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(Self { state, done: false }),
            Err(INITIALIZING) => Err(PoolError::Initializing),
            Err(_) => Err(PoolError::AlreadyInitialized),
        }
    }

    fn commit(mut self) {
        self.state.store(INITIALIZED, Ordering::Release);
        self.done = true;
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.store(UNINITIALIZED, Ordering::Release);
        }
    }
}

#[derive(Default)]
struct Registries {
    /// Most recently released first.
    available: VecDeque<ConnectionHandle>,
    /// Most recently reserved first.
    reserved: VecDeque<ConnectionHandle>,
    /// Slots claimed by connections still being opened.
    pending: u32,
}

impl Registries {
    fn total(&self) -> u32 {
        (self.available.len() + self.reserved.len()) as u32 + self.pending
    }

    /// Claim a capacity slot if one is free.
    fn try_claim(&mut self, max: u32) -> bool {
        if self.total() >= max {
            return false;
        }
        self.pending += 1;
        true
    }
}

/// A claimed capacity slot.
///
/// Dropping it without committing gives the slot back.
struct Slot<'a> {
    registries: &'a Mutex<Registries>,
    held: bool,
}

impl<'a> Slot<'a> {
    /// Wrap a slot already counted in `pending`. The lock must not be held.
    fn claimed(registries: &'a Mutex<Registries>) -> Self {
        Self {
            registries,
            held: true,
        }
    }

    /// Turn the slot into a tracked handle in the given registry.
    ///
    /// Committing as `Reserved` starts a loan; the returned handle carries it.
    fn commit(mut self, handle: ConnectionHandle, state: ConnectionState) -> ConnectionHandle {
        let now = Instant::now();
        let mut reg = self.registries.lock();
        reg.pending -= 1;
        self.held = false;
        match state {
            ConnectionState::Reserved => {
                let loaned = handle.lend(now);
                reg.reserved.push_front(loaned.clone());
                loaned
            }
            _ => {
                handle.mark(state, now);
                reg.available.push_front(handle.clone());
                handle
            }
        }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if self.held {
            self.registries.lock().pending -= 1;
        }
    }
}

/// Connections opened by `initialize` and not yet committed.
///
/// Dropping a non-empty batch gives the slots back and closes the
/// connections in the background.
struct Batch<'a> {
    entries: Vec<(Slot<'a>, ConnectionHandle)>,
    metrics: &'a Arc<MetricsRecorder>,
}

impl<'a> Batch<'a> {
    fn new(metrics: &'a Arc<MetricsRecorder>) -> Self {
        Self {
            entries: Vec::new(),
            metrics,
        }
    }

    fn push(&mut self, slot: Slot<'a>, handle: ConnectionHandle) {
        self.entries.push((slot, handle));
    }

    /// Give the slots back and hand over the handles for closing.
    fn abandon(&mut self) -> Vec<ConnectionHandle> {
        self.entries.drain(..).map(|(_slot, handle)| handle).collect()
    }

    /// Track every handle as available. Returns how many were committed.
    fn commit(mut self) -> usize {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        for (slot, handle) in entries {
            slot.commit(handle, ConnectionState::Available);
        }
        count
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        let handles = self.abandon();
        close_in_background(handles, Arc::clone(self.metrics), "cancelled");
    }
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a pool that opens connections through `runtime`.
    ///
    /// No connection is opened until [`initialize`](Pool::initialize) or the
    /// first [`reserve`](Pool::reserve).
    pub fn new(config: PoolConfig, runtime: Arc<dyn DriverRuntime>) -> Result<Self, PoolError> {
        config.validate()?;

        let config = Arc::new(config);
        let metrics = Arc::new(MetricsRecorder::new());
        let factory = ConnectionFactory::new(
            DriverManager::new(runtime),
            Arc::clone(&config),
            Arc::clone(&metrics),
        );

        tracing::info!(
            min = config.min_pool_size,
            max = config.max_pool_size,
            keepalive = config.keepalive.enabled,
            idle_eviction = config.effective_max_idle().is_some(),
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                reaper: IdleReaper::new(config.effective_max_idle()),
                config,
                factory,
                registries: Mutex::new(Registries::default()),
                init: AtomicU8::new(UNINITIALIZED),
                metrics,
            }),
        })
    }

    /// Register the configured driver class, then open `min_pool_size`
    /// connections into the available registry.
    ///
    /// If any connection fails to open, the ones already opened by this call
    /// are closed and the pool is left empty and uninitialized. The same
    /// holds if the returned future is dropped before it completes.
    ///
    /// Fails with [`PoolError::Initializing`] while another `initialize` is
    /// running and with [`PoolError::AlreadyInitialized`] after one succeeded.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let guard = InitGuard::begin(&self.inner.init)?;

        match self.populate().await {
            Ok(opened) => {
                guard.commit();
                tracing::info!(connections = opened, "connection pool initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "connection pool initialization failed");
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, PoolError> {
        if let Some(class) = self.inner.config.mode.driver_class() {
            let manager = self.inner.factory.manager().clone();
            let class = class.to_string();
            tokio::task::spawn_blocking(move || manager.register_driver(&class)).await??;
        }

        let max = self.inner.config.max_pool_size;
        let mut opened = Batch::new(&self.inner.metrics);

        for _ in 0..self.inner.config.min_pool_size {
            if !self.inner.registries.lock().try_claim(max) {
                // Concurrent reservations already took the remaining capacity.
                break;
            }
            let slot = Slot::claimed(&self.inner.registries);

            match self.inner.factory.create().await {
                Ok(handle) => opened.push(slot, handle),
                Err(e) => {
                    drop(slot);
                    let handles = opened.abandon();
                    self.close_detached(handles, "rollback").await;
                    return Err(e);
                }
            }
        }

        Ok(opened.commit())
    }

    /// Reserve a connection.
    ///
    /// Idle connections past the threshold are reaped first. Then the most
    /// recently released connection is handed out, or a new one is opened if
    /// the pool has room. Fails with [`PoolError::Exhausted`] otherwise;
    /// there is no waiting.
    pub async fn reserve(&self) -> Result<ConnectionHandle, PoolError> {
        self.reap_idle().await;

        let max = self.inner.config.max_pool_size;
        {
            let mut reg = self.inner.registries.lock();
            if let Some(pooled) = reg.available.pop_front() {
                let handle = pooled.lend(Instant::now());
                reg.reserved.push_front(handle.clone());
                drop(reg);

                self.inner.metrics.reservation(true);
                tracing::debug!(connection_id = %handle.id(), "reserved pooled connection");
                return Ok(handle);
            }

            if !reg.try_claim(max) {
                drop(reg);
                self.inner.metrics.reservation(false);
                tracing::debug!(max, "pool exhausted");
                return Err(PoolError::Exhausted { max });
            }
        }

        let slot = Slot::claimed(&self.inner.registries);
        match self.inner.factory.create().await {
            Ok(created) => {
                let handle = slot.commit(created, ConnectionState::Reserved);
                self.inner.metrics.reservation(true);
                tracing::debug!(connection_id = %handle.id(), "reserved new connection");
                Ok(handle)
            }
            Err(e) => {
                drop(slot);
                self.inner.metrics.reservation(false);
                tracing::error!(error = %e, "failed to open connection for reservation");
                Err(e)
            }
        }
    }

    /// Return a reserved connection to the available registry.
    ///
    /// Fails with [`PoolError::InvalidHandle`] if the handle does not carry a
    /// loan that is still outstanding: already released, a clone kept from an
    /// earlier loan of the same connection, evicted, purged, or owned by
    /// another pool.
    pub fn release(&self, handle: ConnectionHandle) -> Result<(), PoolError> {
        let mut reg = self.inner.registries.lock();
        let position = reg.reserved.iter().position(|h| h.same_as(&handle));
        let Some(released) = position.and_then(|pos| reg.reserved.remove(pos)) else {
            drop(reg);
            tracing::warn!(connection_id = %handle.id(), "release of unreserved connection");
            return Err(PoolError::InvalidHandle { id: handle.id() });
        };

        released.mark(ConnectionState::Available, Instant::now());
        reg.available.push_front(released);
        drop(reg);

        tracing::debug!(connection_id = %handle.id(), "connection released");
        Ok(())
    }

    /// Probe every tracked connection and report the registries.
    ///
    /// Makes live calls on each connection; intended for diagnostics.
    pub async fn status(&self) -> Result<PoolStatus, PoolError> {
        let (available, reserved): (Vec<_>, Vec<_>) = {
            let reg = self.inner.registries.lock();
            (
                reg.available.iter().cloned().collect(),
                reg.reserved.iter().cloned().collect(),
            )
        };

        let timeout = self.inner.config.validity_timeout;
        let (available_detail, reserved_detail) = tokio::task::spawn_blocking(move || {
            (
                probe_all(&available, timeout),
                probe_all(&reserved, timeout),
            )
        })
        .await?;

        Ok(PoolStatus {
            available: available_detail.len(),
            reserved: reserved_detail.len(),
            max: self.inner.config.max_pool_size,
            available_detail,
            reserved_detail,
        })
    }

    /// Close every tracked connection and empty both registries.
    ///
    /// Close failures are logged and skipped. Reserved handles are closed
    /// too; releasing one afterwards fails with
    /// [`PoolError::InvalidHandle`]. The pool can be initialized again.
    ///
    /// Connections still being opened when the purge starts are not waited
    /// for. A `reserve` that was growing the pool completes normally and its
    /// connection is tracked as a fresh loan of the purged pool; an
    /// `initialize` in progress completes and leaves the pool initialized.
    pub async fn purge(&self) {
        let handles: Vec<ConnectionHandle> = {
            let mut reg = self.inner.registries.lock();
            let mut handles: Vec<_> = std::mem::take(&mut reg.available).into();
            handles.extend(std::mem::take(&mut reg.reserved));
            handles
        };

        let count = handles.len();
        self.close_detached(handles, "purge").await;
        // An initialize still in progress keeps its own state.
        let _ = self.inner.init.compare_exchange(
            INITIALIZED,
            UNINITIALIZED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        tracing::info!(connections = count, "connection pool purged");
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics.snapshot()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether [`initialize`](Pool::initialize) has completed successfully.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.init.load(Ordering::Acquire) == INITIALIZED
    }

    /// Driver manager for the pool's runtime, e.g. for login timeouts.
    #[must_use]
    pub fn driver_manager(&self) -> &DriverManager {
        self.inner.factory.manager()
    }

    async fn reap_idle(&self) {
        if !self.inner.reaper.is_active() {
            return;
        }

        let evicted = {
            let mut reg = self.inner.registries.lock();
            let now = Instant::now();
            let mut evicted = self.inner.reaper.reap(&mut reg.available, now);
            evicted.extend(self.inner.reaper.reap(&mut reg.reserved, now));
            evicted
        };

        if evicted.is_empty() {
            return;
        }
        self.inner.metrics.idle_evicted(evicted.len());
        self.close_detached(evicted, "idle").await;
    }

    /// Close handles already removed from both registries.
    async fn close_detached(&self, handles: Vec<ConnectionHandle>, reason: &'static str) {
        if handles.is_empty() {
            return;
        }
        // Stop keepalive now even if the close below never gets to run.
        for handle in &handles {
            handle.retire();
        }

        let metrics = Arc::clone(&self.inner.metrics);
        let result =
            tokio::task::spawn_blocking(move || close_handles(&handles, &metrics, reason)).await;
        match result {
            Ok(0) => {}
            Ok(failures) => tracing::warn!(failures, reason, "some connections failed to close"),
            Err(e) => tracing::warn!(error = %e, reason, "close task failed"),
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reg = self.inner.registries.lock();
        f.debug_struct("Pool")
            .field("available", &reg.available.len())
            .field("reserved", &reg.reserved.len())
            .field("pending", &reg.pending)
            .field("max", &self.inner.config.max_pool_size)
            .finish_non_exhaustive()
    }
}

fn probe_all(handles: &[ConnectionHandle], timeout: Duration) -> Vec<ConnectionStatus> {
    handles.iter().map(|h| probe(h, timeout)).collect()
}

fn probe(handle: &ConnectionHandle, timeout: Duration) -> ConnectionStatus {
    let conn = handle.connection();
    let id = handle.id();

    let closed = conn.is_closed().unwrap_or_else(|e| {
        tracing::debug!(connection_id = %id, error = %e, "closed check failed");
        true
    });
    let read_only = conn.is_read_only().unwrap_or_else(|e| {
        tracing::debug!(connection_id = %id, error = %e, "read-only check failed");
        false
    });
    let valid = conn.is_valid(timeout).unwrap_or_else(|e| {
        tracing::debug!(connection_id = %id, error = %e, "validity check failed");
        false
    });

    ConnectionStatus {
        id,
        closed,
        read_only,
        valid,
    }
}

/// Builder for creating a connection pool.
///
/// Unlike [`PoolConfig`], the builder accepts a driver class and a data
/// source class separately and rejects configurations that set both.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .url("jdbc:h2:mem:app")
///     .data_source("org.h2.jdbcx.JdbcDataSource")
///     .max_pool_size(4)
///     .runtime(runtime)
///     .build()?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
    driver_class: Option<String>,
    data_source: Option<String>,
    runtime: Option<Arc<dyn DriverRuntime>>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            driver_class: None,
            data_source: None,
            runtime: None,
        }
    }

    /// Replace the pool configuration wholesale.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the driver runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: Arc<dyn DriverRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the connection URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Register this driver class during initialization.
    #[must_use]
    pub fn driver_class(mut self, class_name: impl Into<String>) -> Self {
        self.driver_class = Some(class_name.into());
        self
    }

    /// Open connections through this data source class.
    #[must_use]
    pub fn data_source(mut self, class_name: impl Into<String>) -> Self {
        self.data_source = Some(class_name.into());
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_pool_size(mut self, count: u32) -> Self {
        self.config.min_pool_size = count;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, count: u32) -> Self {
        self.config.max_pool_size = count;
        self
    }

    /// Set the idle eviction threshold.
    #[must_use]
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.config.max_idle = Some(max_idle);
        self
    }

    /// Set the keepalive settings.
    #[must_use]
    pub fn keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.config.keepalive = keepalive;
        self
    }

    /// Add a driver property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.set(key, value);
        self
    }

    /// Set the validity check timeout used by `status`.
    #[must_use]
    pub fn validity_timeout(mut self, timeout: Duration) -> Self {
        self.config.validity_timeout = timeout;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<Pool, PoolError> {
        let mut config = self.config;
        match (self.driver_class, self.data_source) {
            (Some(driver), Some(source)) => {
                return Err(PoolError::Config(format!(
                    "driver class {driver} and data source {source} are mutually exclusive"
                )));
            }
            (Some(driver), None) => {
                config.mode = CreationMode::DriverManager {
                    driver_class: Some(driver),
                };
            }
            (None, Some(source)) => {
                config.mode = CreationMode::DataSource { class_name: source };
            }
            (None, None) => {}
        }

        let runtime = self
            .runtime
            .ok_or_else(|| PoolError::Config("no driver runtime configured".into()))?;
        Pool::new(config, runtime)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// Number of connections waiting to be reserved.
    pub available: usize,
    /// Number of connections loaned out.
    pub reserved: usize,
    /// Maximum allowed connections.
    pub max: u32,
    /// Probe results for available connections, most recently released first.
    pub available_detail: Vec<ConnectionStatus>,
    /// Probe results for reserved connections, most recently reserved first.
    pub reserved_detail: Vec<ConnectionStatus>,
}

impl PoolStatus {
    /// Total tracked connections.
    #[must_use]
    pub fn total(&self) -> usize {
        self.available + self.reserved
    }

    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.reserved as f64 / f64::from(self.max)) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total() >= self.max as usize
    }

    /// Whether any tracked connection has the given id.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.available_detail
            .iter()
            .chain(&self.reserved_detail)
            .any(|c| c.id == id)
    }
}

/// Live probe result for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Handle identifier.
    pub id: Uuid,
    /// Whether the connection reports itself closed.
    pub closed: bool,
    /// Whether the connection is read-only.
    pub read_only: bool,
    /// Whether the connection passed its validity check.
    pub valid: bool,
}
