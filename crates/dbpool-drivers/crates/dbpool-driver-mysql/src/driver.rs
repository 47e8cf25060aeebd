//! MySQL driver implementation

use async_trait::async_trait;
use dbpool_core::{Connection, DatabaseDriver, DbPoolError, Dsn, Result};
use std::sync::Arc;

use crate::MySqlConnection;

/// MySQL database driver
pub struct MySqlDriver;

impl MySqlDriver {
    /// Create a new MySQL driver instance
    pub fn new() -> Self {
        tracing::debug!("MySQL driver initialized");
        Self
    }
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }

    fn connection_string_help(&self) -> &'static str {
        "user:password@tcp(host:port)/database?charset=utf8mb4&parseTime=true&loc=Local&timeout=5s"
    }

    #[tracing::instrument(skip(self, dsn), fields(address = %dsn.address(), database = dsn.database()))]
    async fn connect(&self, dsn: &Dsn) -> Result<Arc<dyn Connection>> {
        let conn = MySqlConnection::connect(dsn).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to MySQL database");
            match e {
                DbPoolError::Connect(_) => e,
                other => DbPoolError::Connect(format!("Failed to connect to MySQL database: {}", other)),
            }
        })?;

        tracing::info!(address = %dsn.address(), database = ?dsn.database(), "MySQL connection created");
        Ok(Arc::new(conn))
    }
}
