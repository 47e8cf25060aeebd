//! dbpool connection - the process-wide connection pool manager
//!
//! This crate opens and shares one bounded connection pool per process:
//! configuration loading, pool lifecycle, health checks, and logging setup.

mod config;
mod database;
pub mod health;
pub mod logging;
mod manager;
pub mod pool;

#[cfg(test)]
mod testing;

pub use config::PoolConfig;
pub use database::Database;
pub use health::ping_database;
pub use logging::{LoggingConfig, LoggingGuard};
pub use manager::ConnectionPoolManager;
pub use pool::{ConnectionFactory, ConnectionPool, PoolLimits, PoolStats, PooledConnection};

pub use dbpool_core::{
    Connection, DatabaseDriver, DbPoolError, Dsn, LogLevel, LogSink, QueryResult, Result, Row,
    StatementResult, Value,
};
pub use dbpool_drivers::DriverRegistry;
