//! Pool configuration.

use std::time::Duration;

use jdbc_bridge::Properties;

use crate::error::PoolError;

/// How the pool opens new connections.
///
/// The two paths are mutually exclusive for a given pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum CreationMode {
    /// Connect through the runtime's driver registry.
    DriverManager {
        /// Driver class to instantiate and register during initialization.
        ///
        /// `None` when the driver registers itself or is already loaded.
        #[cfg_attr(feature = "serde", serde(default))]
        driver_class: Option<String>,
    },
    /// Connect through a vendor data source configured with setters.
    DataSource {
        /// Data source class to instantiate for every connection.
        class_name: String,
    },
}

impl Default for CreationMode {
    fn default() -> Self {
        Self::DriverManager { driver_class: None }
    }
}

impl CreationMode {
    /// Driver class that must be registered before connecting, if any.
    #[must_use]
    pub fn driver_class(&self) -> Option<&str> {
        match self {
            Self::DriverManager { driver_class } => driver_class.as_deref(),
            Self::DataSource { .. } => None,
        }
    }
}

/// Periodic probe settings that stop the server from dropping idle
/// connections.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KeepaliveConfig {
    /// Whether probes run at all.
    pub enabled: bool,

    /// Time between probes (default: 60 seconds).
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub interval: Duration,

    /// Statement executed by each probe (default: `select 1`).
    pub query: String,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_millis(60_000),
            query: "select 1".to_string(),
        }
    }
}

impl KeepaliveConfig {
    /// Enabled keepalive with the given interval and the default query.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            enabled: true,
            interval,
            ..Self::default()
        }
    }

    /// Set the probe query.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

/// Configuration for the connection pool.
///
/// Validated once when the pool is created and immutable afterwards.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Connection URL passed to the driver or data source.
    pub url: String,

    /// Connection creation path.
    pub mode: CreationMode,

    /// User name.
    pub user: Option<String>,

    /// Password.
    pub password: Option<String>,

    /// Connections opened by `initialize` (default: 1).
    #[cfg_attr(feature = "serde", serde(alias = "minpoolsize"))]
    pub min_pool_size: u32,

    /// Upper bound on available plus reserved connections (default: 1).
    #[cfg_attr(feature = "serde", serde(alias = "maxpoolsize"))]
    pub max_pool_size: u32,

    /// Close connections idle for longer than this.
    ///
    /// Ignored while keepalive is enabled.
    #[cfg_attr(feature = "serde", serde(alias = "maxidle", with = "millis::option"))]
    pub max_idle: Option<Duration>,

    /// Keepalive probe settings.
    pub keepalive: KeepaliveConfig,

    /// Extra properties forwarded to the driver.
    pub properties: Properties,

    /// Timeout for the validity check made by `status` (default: 1 second).
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub validity_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mode: CreationMode::default(),
            user: None,
            password: None,
            min_pool_size: 1,
            max_pool_size: 1,
            max_idle: None,
            keepalive: KeepaliveConfig::default(),
            properties: Properties::new(),
            validity_timeout: Duration::from_millis(1000),
        }
    }
}

impl PoolConfig {
    /// Create a configuration for the given URL with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the creation mode.
    #[must_use]
    pub fn mode(mut self, mode: CreationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_pool_size(mut self, count: u32) -> Self {
        self.min_pool_size = count;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, count: u32) -> Self {
        self.max_pool_size = count;
        self
    }

    /// Set the idle eviction threshold.
    #[must_use]
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Set the keepalive settings.
    #[must_use]
    pub fn keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Add a driver property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Set the validity check timeout used by `status`.
    #[must_use]
    pub fn validity_timeout(mut self, timeout: Duration) -> Self {
        self.validity_timeout = timeout;
        self
    }

    /// Idle threshold actually in force.
    ///
    /// `None` when idle eviction is off: no threshold, a zero threshold, or
    /// keepalive enabled.
    #[must_use]
    pub fn effective_max_idle(&self) -> Option<Duration> {
        if self.keepalive.enabled {
            return None;
        }
        self.max_idle.filter(|d| !d.is_zero())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.url.trim().is_empty() {
            return Err(PoolError::Config("url cannot be empty".into()));
        }

        if self.min_pool_size == 0 {
            return Err(PoolError::Config(
                "min_pool_size must be at least 1".into(),
            ));
        }

        if self.max_pool_size < self.min_pool_size {
            return Err(PoolError::Config(format!(
                "max_pool_size ({}) must be >= min_pool_size ({})",
                self.max_pool_size, self.min_pool_size
            )));
        }

        match &self.mode {
            CreationMode::DriverManager {
                driver_class: Some(class),
            } if class.trim().is_empty() => {
                return Err(PoolError::Config("driver class cannot be empty".into()));
            }
            CreationMode::DataSource { class_name } if class_name.trim().is_empty() => {
                return Err(PoolError::Config(
                    "data source class cannot be empty".into(),
                ));
            }
            _ => {}
        }

        if self.keepalive.enabled {
            if self.keepalive.interval.is_zero() {
                return Err(PoolError::Config(
                    "keepalive interval must be greater than zero".into(),
                ));
            }
            if self.keepalive.query.trim().is_empty() {
                return Err(PoolError::Config("keepalive query cannot be empty".into()));
            }
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::new("jdbc:h2:mem:test");
        assert_eq!(config.min_pool_size, 1);
        assert_eq!(config.max_pool_size, 1);
        assert!(!config.keepalive.enabled);
        assert_eq!(config.keepalive.interval, Duration::from_secs(60));
        assert_eq!(config.keepalive.query, "select 1");
        assert_eq!(config.validity_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_size_validation() {
        assert!(
            PoolConfig::new("jdbc:h2:mem:test")
                .min_pool_size(0)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::new("jdbc:h2:mem:test")
                .min_pool_size(3)
                .max_pool_size(2)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::new("jdbc:h2:mem:test")
                .min_pool_size(2)
                .max_pool_size(2)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            PoolConfig::default().validate(),
            Err(PoolError::Config(_))
        ));
    }

    #[test]
    fn test_mode_validation() {
        let config = PoolConfig::new("jdbc:h2:mem:test").mode(CreationMode::DataSource {
            class_name: " ".into(),
        });
        assert!(config.validate().is_err());

        let config = PoolConfig::new("jdbc:h2:mem:test").mode(CreationMode::DriverManager {
            driver_class: Some(String::new()),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keepalive_validation() {
        let config = PoolConfig::new("jdbc:h2:mem:test").keepalive(KeepaliveConfig::every(
            Duration::ZERO,
        ));
        assert!(config.validate().is_err());

        let config = PoolConfig::new("jdbc:h2:mem:test")
            .keepalive(KeepaliveConfig::every(Duration::from_secs(1)).query(""));
        assert!(config.validate().is_err());

        // Disabled keepalive settings are not checked.
        let config = PoolConfig::new("jdbc:h2:mem:test").keepalive(KeepaliveConfig {
            enabled: false,
            interval: Duration::ZERO,
            query: String::new(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keepalive_disables_idle_eviction() {
        let config = PoolConfig::new("jdbc:h2:mem:test").max_idle(Duration::from_millis(100));
        assert_eq!(config.effective_max_idle(), Some(Duration::from_millis(100)));

        let config = config.keepalive(KeepaliveConfig::every(Duration::from_secs(30)));
        assert_eq!(config.effective_max_idle(), None);

        let config = PoolConfig::new("jdbc:h2:mem:test").max_idle(Duration::ZERO);
        assert_eq!(config.effective_max_idle(), None);
    }

    #[test]
    fn test_driver_class_accessor() {
        let mode = CreationMode::DriverManager {
            driver_class: Some("org.h2.Driver".into()),
        };
        assert_eq!(mode.driver_class(), Some("org.h2.Driver"));

        let mode = CreationMode::DataSource {
            class_name: "org.h2.jdbcx.JdbcDataSource".into(),
        };
        assert_eq!(mode.driver_class(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_deserialize_from_json() {
        let config: PoolConfig = serde_json::from_str(
            r#"{
                "url": "jdbc:h2:mem:test",
                "mode": { "type": "data_source", "class_name": "org.h2.jdbcx.JdbcDataSource" },
                "minpoolsize": 2,
                "maxpoolsize": 4,
                "maxidle": 500,
                "keepalive": { "enabled": false, "interval": 1000 },
                "properties": { "loginTimeout": "5" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.min_pool_size, 2);
        assert_eq!(config.max_pool_size, 4);
        assert_eq!(config.max_idle, Some(Duration::from_millis(500)));
        assert_eq!(config.keepalive.interval, Duration::from_secs(1));
        assert_eq!(config.keepalive.query, "select 1");
        assert_eq!(config.properties.get("loginTimeout"), Some("5"));
        assert!(matches!(config.mode, CreationMode::DataSource { .. }));
        assert!(config.validate().is_ok());
    }
}
