//! Database driver trait definition

use crate::{Connection, Dsn, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens physical connections for one database engine.
///
/// Drivers are looked up by [`DatabaseDriver::name`], which matches the scheme
/// of a DSN (`mysql://...`, or the default driver when the DSN has none).
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "mysql")
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Connection string format help text
    fn connection_string_help(&self) -> &'static str {
        ""
    }

    /// Open a new physical connection
    async fn connect(&self, dsn: &Dsn) -> Result<Arc<dyn Connection>>;
}
