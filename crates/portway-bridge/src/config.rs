//! Configuration structs
//!
//! All structs deserialize from partial input; missing fields take the
//! documented defaults. Durations are written as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{BridgeError, Result};

/// Serde helpers for `Duration` as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Per-bridge call behaviour and integrations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Applied to a call only when the caller's context has no deadline
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// Extra connect attempts when a connection pool opens a connection
    pub retry_count: u32,
    /// Pause between reconnect attempts
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Upper bound on concurrent calls
    pub max_concurrency: usize,
    pub enable_discovery: bool,
    pub enable_metrics: bool,
    /// Passed to adapters as the `compression` option
    pub enable_compression: bool,
    /// Passed to adapters as the `buffer_size` option
    pub buffer_size: usize,
    /// Filter directive for [`LoggingConfig`]
    pub log_level: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            max_concurrency: 100,
            enable_discovery: true,
            enable_metrics: true,
            enable_compression: true,
            buffer_size: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(BridgeError::Config("default_timeout must be non-zero".into()));
        }
        if self.max_concurrency == 0 {
            return Err(BridgeError::Config("max_concurrency must be at least 1".into()));
        }
        if self.log_level.trim().is_empty() {
            return Err(BridgeError::Config("log_level must not be empty".into()));
        }
        Ok(())
    }
}

/// Event bus and health monitoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub name: String,
    /// Log every raised event at debug level
    pub enable_event_logging: bool,
    /// Timeout given to event handlers and reconnect attempts
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// Upper bound on concurrently running event handlers
    pub max_concurrent_tasks: usize,
    /// Zero disables the heartbeat monitor
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,
    pub connection_retry_limit: u32,
    pub auto_reconnect: bool,
    /// Connect every adapter that initialized successfully
    pub connect_on_initialize: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            enable_event_logging: true,
            default_timeout: Duration::from_secs(30),
            max_concurrent_tasks: 10,
            heartbeat_interval: Duration::from_secs(15),
            connection_retry_limit: 5,
            auto_reconnect: true,
            connect_on_initialize: true,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(BridgeError::Config("default_timeout must be non-zero".into()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(BridgeError::Config(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Defaults applied to bridges created by a manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub default_options: BridgeOptions,
    pub default_config: BridgeConfig,
    /// Bound on [`shutdown_all`](crate::BridgeManager::shutdown_all)
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
    /// Period of the bridge health monitor; zero disables it
    #[serde(with = "duration_ms")]
    pub health_check_interval: Duration,
    /// Consecutive failed checks before a bridge is reported unhealthy
    pub unhealthy_threshold: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_options: BridgeOptions::default(),
            default_config: BridgeConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            unhealthy_threshold: 3,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        self.default_options.validate()?;
        self.default_config.validate()?;
        if self.shutdown_timeout.is_zero() {
            return Err(BridgeError::Config("shutdown_timeout must be non-zero".into()));
        }
        if self.unhealthy_threshold == 0 {
            return Err(BridgeError::Config("unhealthy_threshold must be at least 1".into()));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl From<&BridgeOptions> for LoggingConfig {
    fn from(options: &BridgeOptions) -> Self {
        Self {
            level: options.log_level.clone(),
            ..Default::default()
        }
    }
}
