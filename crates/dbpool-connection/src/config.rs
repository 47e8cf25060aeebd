//! Pool configuration
//!
//! `PoolConfig` is the one value handed to
//! [`ConnectionPoolManager::initialize`](crate::ConnectionPoolManager::initialize).
//! It can be built in code, parsed from TOML, or read from `DB_*` environment
//! variables. Durations use Go notation (`"1h"`, `"500ms"`, `"1m30s"`).
//!
//! ```toml
//! dsn = "root:root@tcp(127.0.0.1:3306)/gorm?charset=utf8&parseTime=True&loc=Local&timeout=10ms"
//! max_idle_conns = 10
//! max_open_conns = 100
//! conn_max_lifetime = "1h"
//! slow_query_threshold = "1s"
//! log_level = "silent"
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use dbpool_core::duration::{self, parse_duration};
use dbpool_core::{DbPoolError, LogLevel, LogSink, LoggerConfig, Result};
use serde::{Deserialize, Serialize};

use crate::pool::PoolLimits;

/// Prefix of the environment variables read by [`PoolConfig::from_env`]
pub const ENV_PREFIX: &str = "DB_";

/// Everything needed to open and run the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Data source name, e.g. `user:pass@tcp(host:3306)/db?parseTime=True`
    pub dsn: String,
    /// Maximum number of idle connections kept for reuse
    pub max_idle_conns: usize,
    /// Maximum number of open connections
    pub max_open_conns: usize,
    /// Maximum connection age; zero means connections never expire
    #[serde(with = "duration::as_go")]
    pub conn_max_lifetime: Duration,
    /// Maximum time a connection may sit idle
    #[serde(with = "duration::option_as_go", skip_serializing_if = "Option::is_none")]
    pub conn_max_idle_time: Option<Duration>,
    /// How long `acquire` waits for a free connection
    #[serde(with = "duration::as_go")]
    pub acquire_timeout: Duration,
    /// Statements slower than this are logged at `warn`
    #[serde(with = "duration::as_go")]
    pub slow_query_threshold: Duration,
    pub log_level: LogLevel,
    /// Keep "record not found" out of the error log
    pub ignore_record_not_found: bool,
    /// Colorize SQL log records
    pub colorful: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            max_idle_conns: 10,
            max_open_conns: 100,
            conn_max_lifetime: Duration::from_secs(3600),
            conn_max_idle_time: None,
            acquire_timeout: Duration::from_secs(30),
            slow_query_threshold: Duration::from_secs(1),
            log_level: LogLevel::Silent,
            ignore_record_not_found: true,
            colorful: false,
        }
    }
}

impl PoolConfig {
    /// Default settings for the given DSN
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    /// Quiet settings for production: SQL logging off
    pub fn production(dsn: impl Into<String>) -> Self {
        Self::new(dsn)
    }

    /// Verbose settings for development: every statement logged in color
    pub fn development(dsn: impl Into<String>) -> Self {
        Self {
            log_level: LogLevel::Info,
            colorful: true,
            ..Self::new(dsn)
        }
    }

    pub fn with_max_idle_conns(mut self, max_idle: usize) -> Self {
        self.max_idle_conns = max_idle;
        self
    }

    pub fn with_max_open_conns(mut self, max_open: usize) -> Self {
        self.max_open_conns = max_open;
        self
    }

    pub fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    pub fn with_conn_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.conn_max_idle_time = Some(idle_time);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input)
            .map_err(|e| DbPoolError::Configuration(format!("invalid pool config: {}", e)))
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading pool config");
        Self::from_toml_str(&contents)
    }

    /// Build a config from `DB_*` environment variables
    ///
    /// `DB_DSN` is required; every other variable falls back to its default.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Build a config from variables supplied by `lookup`
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let dsn = var("DSN").ok_or_else(|| {
            DbPoolError::Configuration(format!("{}DSN is not set", ENV_PREFIX))
        })?;
        let mut config = Self::new(dsn);

        if let Some(v) = var("MAX_IDLE_CONNS") {
            config.max_idle_conns = parse_env("MAX_IDLE_CONNS", &v)?;
        }
        if let Some(v) = var("MAX_OPEN_CONNS") {
            config.max_open_conns = parse_env("MAX_OPEN_CONNS", &v)?;
        }
        if let Some(v) = var("CONN_MAX_LIFETIME") {
            config.conn_max_lifetime = env_duration("CONN_MAX_LIFETIME", &v)?;
        }
        if let Some(v) = var("CONN_MAX_IDLE_TIME") {
            config.conn_max_idle_time = Some(env_duration("CONN_MAX_IDLE_TIME", &v)?);
        }
        if let Some(v) = var("ACQUIRE_TIMEOUT") {
            config.acquire_timeout = env_duration("ACQUIRE_TIMEOUT", &v)?;
        }
        if let Some(v) = var("SLOW_QUERY_THRESHOLD") {
            config.slow_query_threshold = env_duration("SLOW_QUERY_THRESHOLD", &v)?;
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log_level = parse_env("LOG_LEVEL", &v)?;
        }
        if let Some(v) = var("IGNORE_RECORD_NOT_FOUND") {
            config.ignore_record_not_found = parse_env_bool("IGNORE_RECORD_NOT_FOUND", &v)?;
        }
        if let Some(v) = var("LOG_COLORFUL") {
            config.colorful = parse_env_bool("LOG_COLORFUL", &v)?;
        }

        Ok(config)
    }

    /// Derive validated pool limits
    pub fn limits(&self) -> Result<PoolLimits> {
        Ok(PoolLimits::new(self.max_idle_conns, self.max_open_conns)?
            .with_acquire_timeout(self.acquire_timeout)
            .with_max_lifetime(self.conn_max_lifetime)
            .with_max_idle_time(self.conn_max_idle_time))
    }

    /// SQL logger settings writing to `sink`
    pub fn logger_config(&self, sink: LogSink) -> LoggerConfig {
        LoggerConfig {
            sink,
            slow_threshold: self.slow_query_threshold,
            level: self.log_level,
            ignore_record_not_found: self.ignore_record_not_found,
            colorful: self.colorful,
        }
    }
}

fn invalid_env(name: &str, value: &str, reason: impl std::fmt::Display) -> DbPoolError {
    DbPoolError::Configuration(format!(
        "invalid {}{}=`{}`: {}",
        ENV_PREFIX, name, value, reason
    ))
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid_env(name, value, e))
}

fn parse_env_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_env(name, value, "expected a boolean")),
    }
}

fn env_duration(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value.trim()).map_err(|e| invalid_env(name, value, e))
}
