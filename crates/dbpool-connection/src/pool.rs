//! Connection pooling for database connections
//!
//! This module provides a bounded connection pool with an open-connection
//! ceiling, an idle cap, connection lifetime and idle-time expiry, and
//! statistics tracking.
//!
//! # Example
//!
//! ```ignore
//! use dbpool_connection::pool::{ConnectionPool, PoolLimits};
//!
//! let limits = PoolLimits::new(10, 100)?
//!     .with_acquire_timeout(Duration::from_secs(5))
//!     .with_max_lifetime(Duration::from_secs(3600));
//!
//! let pool = ConnectionPool::new(limits, connection_factory);
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
#[allow(clippy::module_inception)]
mod pool;
mod stats;


pub use config::PoolLimits;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
