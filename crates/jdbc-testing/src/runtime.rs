//! Mock driver runtime.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use jdbc_bridge::{
    ConnectArgs, Connection, DataSource, Driver, DriverError, DriverRuntime, Result, Statement,
};
use parking_lot::Mutex;

/// Shared view of one connection handed out by [`MockRuntime`].
#[derive(Debug)]
pub struct ConnectionRecord {
    serial: usize,
    url: String,
    closed: AtomicBool,
    read_only: AtomicBool,
    fail_close: AtomicBool,
    fail_probe: AtomicBool,
    close_calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl ConnectionRecord {
    fn new(serial: usize, url: &str, faults: &Faults) -> Self {
        Self {
            serial,
            url: url.to_string(),
            closed: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            fail_close: AtomicBool::new(faults.fail_close),
            fail_probe: AtomicBool::new(faults.fail_probe),
            close_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creation order, starting at 1.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.serial
    }

    /// URL the connection was opened with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether `close()` has succeeded on this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of `close()` calls, successful or not.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    /// SQL strings executed through statements of this connection.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Toggle read-only mode.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Make subsequent `close()` calls fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::Release);
    }

    /// Make subsequent statement executions fail.
    pub fn set_fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::Release);
    }

    /// Simulate the server dropping the connection.
    pub fn sever(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Connection returned by [`MockRuntime`].
#[derive(Debug)]
pub struct MockConnection {
    record: Arc<ConnectionRecord>,
}

impl Connection for MockConnection {
    fn close(&self) -> Result<()> {
        self.record.close_calls.fetch_add(1, Ordering::AcqRel);
        if self.record.fail_close.load(Ordering::Acquire) {
            return Err(DriverError::Bridge("close failed".into()));
        }
        self.record.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> Result<bool> {
        Ok(self.record.is_closed())
    }

    fn is_valid(&self, _timeout: Duration) -> Result<bool> {
        Ok(!self.record.is_closed())
    }

    fn is_read_only(&self) -> Result<bool> {
        Ok(self.record.read_only.load(Ordering::Acquire))
    }

    fn create_statement(&self) -> Result<Box<dyn Statement>> {
        if self.record.is_closed() {
            return Err(DriverError::Closed);
        }
        Ok(Box::new(MockStatement {
            record: Arc::clone(&self.record),
        }))
    }
}

struct MockStatement {
    record: Arc<ConnectionRecord>,
}

impl Statement for MockStatement {
    fn execute(&mut self, sql: &str) -> Result<bool> {
        if self.record.is_closed() {
            return Err(DriverError::Closed);
        }
        if self.record.fail_probe.load(Ordering::Acquire) {
            return Err(DriverError::Bridge(format!("statement failed: {sql}")));
        }
        self.record.executed.lock().push(sql.to_string());
        Ok(true)
    }
}

struct MockDriver {
    class_name: String,
}

impl Driver for MockDriver {
    fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// Settings a data source was configured with before connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceRecord {
    /// Data source class name.
    pub class_name: String,
    /// URL passed to `set_url`.
    pub url: Option<String>,
    /// User passed to `set_user`.
    pub user: Option<String>,
    /// Password passed to `set_password`.
    pub password: Option<String>,
}

struct MockDataSource {
    record: DataSourceRecord,
    runtime: MockRuntime,
}

impl DataSource for MockDataSource {
    fn set_url(&mut self, url: &str) -> Result<()> {
        self.record.url = Some(url.to_string());
        Ok(())
    }

    fn set_user(&mut self, user: &str) -> Result<()> {
        self.record.user = Some(user.to_string());
        Ok(())
    }

    fn set_password(&mut self, password: &str) -> Result<()> {
        self.record.password = Some(password.to_string());
        Ok(())
    }

    fn get_connection(&self) -> Result<Box<dyn Connection>> {
        let url = self
            .record
            .url
            .clone()
            .ok_or_else(|| DriverError::InvalidArguments("data source has no url".into()))?;
        self.runtime
            .state
            .lock()
            .data_sources
            .push(self.record.clone());
        self.runtime.open(&url)
    }
}

#[derive(Debug, Default, Clone)]
struct Faults {
    connect_after: Option<usize>,
    fail_register: bool,
    fail_close: bool,
    fail_probe: bool,
}

#[derive(Default)]
struct RuntimeState {
    faults: Faults,
    missing_classes: HashSet<String>,
    connect_delay: Option<Duration>,
    connections: Vec<Arc<ConnectionRecord>>,
    connect_calls: Vec<(String, ConnectArgs)>,
    registered: Vec<String>,
    data_sources: Vec<DataSourceRecord>,
    login_timeout: u32,
}

/// In-memory [`DriverRuntime`].
///
/// Cloning shares the same recorded state, so a test can keep one clone for
/// inspection while the pool owns another.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl MockRuntime {
    /// Create a runtime where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block each connect call for `delay` before returning.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.state.lock().connect_delay = Some(delay);
        self
    }

    /// Allow `count` successful connects, then fail every later one.
    #[must_use]
    pub fn fail_connect_after(self, count: usize) -> Self {
        self.state.lock().faults.connect_after = Some(count);
        self
    }

    /// Fail every driver registration.
    #[must_use]
    pub fn fail_registration(self) -> Self {
        self.state.lock().faults.fail_register = true;
        self
    }

    /// Connections created from now on fail to close.
    #[must_use]
    pub fn fail_close(self) -> Self {
        self.state.lock().faults.fail_close = true;
        self
    }

    /// Connections created from now on fail every statement.
    #[must_use]
    pub fn fail_probes(self) -> Self {
        self.state.lock().faults.fail_probe = true;
        self
    }

    /// Treat `class_name` as absent from the classpath.
    #[must_use]
    pub fn with_missing_class(self, class_name: impl Into<String>) -> Self {
        self.state.lock().missing_classes.insert(class_name.into());
        self
    }

    /// Stop failing connects.
    pub fn heal(&self) {
        self.state.lock().faults.connect_after = None;
    }

    /// Every connection opened so far, in creation order.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<ConnectionRecord>> {
        self.state.lock().connections.clone()
    }

    /// Number of opened connections that have not been closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state
            .lock()
            .connections
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Arguments of every driver-manager connect call.
    #[must_use]
    pub fn connect_calls(&self) -> Vec<(String, ConnectArgs)> {
        self.state.lock().connect_calls.clone()
    }

    /// Class names of registered drivers.
    #[must_use]
    pub fn registered_drivers(&self) -> Vec<String> {
        self.state.lock().registered.clone()
    }

    /// Data sources that were asked for a connection.
    #[must_use]
    pub fn data_sources(&self) -> Vec<DataSourceRecord> {
        self.state.lock().data_sources.clone()
    }

    fn open(&self, url: &str) -> Result<Box<dyn Connection>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if let Some(limit) = state.faults.connect_after {
            if state.connections.len() >= limit {
                return Err(DriverError::connect(url, "connection refused"));
            }
        }

        let record = Arc::new(ConnectionRecord::new(
            state.connections.len() + 1,
            url,
            &state.faults,
        ));
        state.connections.push(Arc::clone(&record));

        tracing::trace!(serial = record.serial, url = url, "mock connection opened");
        Ok(Box::new(MockConnection { record }))
    }

    fn check_class(&self, class_name: &str) -> Result<()> {
        if self.state.lock().missing_classes.contains(class_name) {
            return Err(DriverError::ClassNotFound(class_name.to_string()));
        }
        Ok(())
    }
}

impl DriverRuntime for MockRuntime {
    fn new_driver(&self, class_name: &str) -> Result<Box<dyn Driver>> {
        self.check_class(class_name)?;
        Ok(Box::new(MockDriver {
            class_name: class_name.to_string(),
        }))
    }

    fn register_driver(&self, driver: Box<dyn Driver>) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.fail_register {
            return Err(DriverError::registration(
                driver.class_name(),
                "registration rejected",
            ));
        }
        state.registered.push(driver.class_name().to_string());
        Ok(())
    }

    fn get_connection(&self, url: &str, args: &ConnectArgs) -> Result<Box<dyn Connection>> {
        self.state
            .lock()
            .connect_calls
            .push((url.to_string(), args.clone()));
        self.open(url)
    }

    fn new_data_source(&self, class_name: &str) -> Result<Box<dyn DataSource>> {
        self.check_class(class_name)?;
        Ok(Box::new(MockDataSource {
            record: DataSourceRecord {
                class_name: class_name.to_string(),
                ..DataSourceRecord::default()
            },
            runtime: self.clone(),
        }))
    }

    fn login_timeout(&self) -> Result<u32> {
        Ok(self.state.lock().login_timeout)
    }

    fn set_login_timeout(&self, seconds: u32) -> Result<()> {
        self.state.lock().login_timeout = seconds;
        Ok(())
    }
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockRuntime")
            .field("connections", &state.connections.len())
            .field("registered", &state.registered)
            .finish()
    }
}
