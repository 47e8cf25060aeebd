//! Pool limit types

use std::time::Duration;

use dbpool_core::{DbPoolError, Result};
use serde::{Deserialize, Serialize};

const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// Validated limits for a connection pool
///
/// Controls pool sizing, acquire timeout, and connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPoolLimits")]
pub struct PoolLimits {
    /// Maximum number of idle connections kept for reuse
    max_idle: usize,
    /// Maximum number of connections open at once (idle + in use)
    max_open: usize,
    /// How long `acquire` waits for a free slot
    acquire_timeout: Duration,
    /// Connections older than this are closed instead of reused
    max_lifetime: Option<Duration>,
    /// Connections idle longer than this are closed instead of reused
    max_idle_time: Option<Duration>,
}

impl PoolLimits {
    /// Create limits with the given idle and open caps.
    ///
    /// Fails with `PoolConfig` if `max_open` is 0 or `max_idle > max_open`.
    pub fn new(max_idle: usize, max_open: usize) -> Result<Self> {
        if max_open == 0 {
            return Err(DbPoolError::PoolConfig(
                "max_open_conns must be greater than 0".into(),
            ));
        }
        if max_idle > max_open {
            return Err(DbPoolError::PoolConfig(format!(
                "max_idle_conns ({}) cannot exceed max_open_conns ({})",
                max_idle, max_open
            )));
        }

        Ok(Self {
            max_idle,
            max_open,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(3600)),
            max_idle_time: None,
        })
    }

    /// Set the acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime; zero means connections never expire
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = (!lifetime.is_zero()).then_some(lifetime);
        self
    }

    /// Set the maximum idle time; `None` or zero disables it
    pub fn with_max_idle_time(mut self, idle_time: Option<Duration>) -> Self {
        self.max_idle_time = idle_time.filter(|d| !d.is_zero());
        self
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime
    }

    pub fn max_idle_time(&self) -> Option<Duration> {
        self.max_idle_time
    }

    /// How often the background reaper should run, if at all
    pub fn reaper_interval(&self) -> Option<Duration> {
        let shortest = match (self.max_lifetime, self.max_idle_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;
        Some(shortest.max(MIN_REAPER_INTERVAL))
    }
}

/// Unchecked wire form of [`PoolLimits`]; deserialization goes through
/// [`PoolLimits::new`]
#[derive(Deserialize)]
struct RawPoolLimits {
    max_idle: usize,
    max_open: usize,
    acquire_timeout: Duration,
    max_lifetime: Option<Duration>,
    max_idle_time: Option<Duration>,
}

impl TryFrom<RawPoolLimits> for PoolLimits {
    type Error = DbPoolError;

    fn try_from(raw: RawPoolLimits) -> Result<Self> {
        Ok(PoolLimits::new(raw.max_idle, raw.max_open)?
            .with_acquire_timeout(raw.acquire_timeout)
            .with_max_lifetime(raw.max_lifetime.unwrap_or(Duration::ZERO))
            .with_max_idle_time(raw.max_idle_time))
    }
}

impl Default for PoolLimits {
    /// Defaults:
    /// - max_idle: 10
    /// - max_open: 100
    /// - acquire_timeout: 30 seconds
    /// - max_lifetime: 1 hour
    /// - max_idle_time: none
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_open: 100,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(3600)),
            max_idle_time: None,
        }
    }
}
