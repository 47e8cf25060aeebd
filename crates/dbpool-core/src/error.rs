//! Error types for dbpool

use std::time::Duration;

use thiserror::Error;

use crate::dsn::DsnError;

/// Core error type for dbpool operations
#[derive(Error, Debug)]
pub enum DbPoolError {
    /// Opening a physical connection failed (bad DSN, unreachable host,
    /// authentication, connect timeout).
    #[error("Connection error: {0}")]
    Connect(String),

    /// Pool limits could not be applied.
    #[error("Pool configuration error: {0}")]
    PoolConfig(String),

    #[error("Connection pool is already initialized with a different configuration")]
    AlreadyInitialized,

    #[error("Connection pool is not initialized")]
    NotInitialized,

    /// The open-connection ceiling was reached and no connection was released
    /// within the wait budget.
    #[error("Connection pool exhausted: no connection became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Record not found")]
    RecordNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbPoolError {
    /// Whether this is the "no rows" outcome of a single-row lookup
    pub fn is_record_not_found(&self) -> bool {
        matches!(self, DbPoolError::RecordNotFound)
    }
}

impl From<DsnError> for DbPoolError {
    fn from(err: DsnError) -> Self {
        DbPoolError::Connect(format!("invalid DSN: {}", err))
    }
}

/// Result type alias for dbpool operations
pub type Result<T> = std::result::Result<T, DbPoolError>;
