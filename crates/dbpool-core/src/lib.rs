//! dbpool core - shared abstractions for the connection pool manager
//!
//! This crate provides the fundamental traits and types that the other
//! dbpool crates depend on. It defines:
//!
//! - `DatabaseDriver` - opens physical connections for a parsed DSN
//! - `Connection` - a single physical connection (execute, query, ping, close)
//! - `Dsn` - the `user:password@tcp(host:port)/db?params` connection string
//! - `SqlLogger` - slow-query and error logging for executed statements
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod driver;
pub mod dsn;
pub mod duration;
mod error;
pub mod sql_logger;
mod types;

pub use connection::*;
pub use driver::*;
pub use dsn::{Address, Dsn, DsnError, Location};
pub use error::*;
pub use sql_logger::{LogLevel, LogSink, LoggerConfig, SqlLogger, TraceKind};
pub use types::*;
