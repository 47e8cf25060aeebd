//! dbpool drivers - database driver implementations
//!
//! This crate provides concrete implementations of the driver traits defined
//! in `dbpool-core` and a registry to look them up by DSN scheme.

#[cfg(feature = "mysql")]
pub use dbpool_driver_mysql as mysql;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbpool-core
pub use dbpool_core::{
    ColumnMeta, Connection, DatabaseDriver, DbPoolError, Dsn, QueryResult, Result, Row,
    StatementResult, Value,
};
