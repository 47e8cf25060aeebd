//! Pool statistics types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state and lifetime counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Maximum number of open connections
    pub max_open: usize,
    /// Connections currently open (idle + in use + being opened)
    pub open: usize,
    /// Connections checked out by callers
    pub in_use: usize,
    /// Connections available for reuse
    pub idle: usize,
    /// Callers currently waiting for a free slot
    pub waiting: usize,
    /// Total number of acquisitions that had to wait
    pub wait_count: u64,
    /// Total time spent waiting for a slot
    pub wait_duration: Duration,
    /// Connections closed because the idle set was full
    pub max_idle_closed: u64,
    /// Connections closed because they sat idle too long
    pub max_idle_time_closed: u64,
    /// Connections closed because they exceeded their lifetime
    pub max_lifetime_closed: u64,
}

impl PoolStats {
    /// Fraction of open connections that are checked out (0.0 to 1.0)
    ///
    /// Returns 0.0 if nothing is open.
    pub fn utilization(&self) -> f64 {
        if self.open == 0 {
            0.0
        } else {
            self.in_use as f64 / self.open as f64
        }
    }

    /// Check if every allowed connection is checked out
    pub fn is_full(&self) -> bool {
        self.in_use >= self.max_open
    }
}
