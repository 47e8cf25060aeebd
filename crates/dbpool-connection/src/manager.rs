//! Process-wide connection pool manager
//!
//! The application builds one [`ConnectionPoolManager`] at startup, shares it
//! (usually behind an `Arc`), and calls [`initialize`](ConnectionPoolManager::initialize)
//! once with its [`PoolConfig`]. Every component then gets the same
//! [`Database`] handle from [`get`](ConnectionPoolManager::get).

use std::sync::Arc;

use async_trait::async_trait;
use dbpool_core::{Connection, DatabaseDriver, DbPoolError, Dsn, LogSink, Result, SqlLogger};
use dbpool_drivers::DriverRegistry;
use tokio::sync::OnceCell;

use crate::config::PoolConfig;
use crate::database::Database;
use crate::pool::{ConnectionFactory, ConnectionPool};

/// Opens pool connections through a registered driver
struct DriverConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    dsn: Dsn,
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        connect_with_timeout(self.driver.as_ref(), &self.dsn).await
    }
}

/// Open one connection, bounded by the DSN `timeout` when it has one
async fn connect_with_timeout(driver: &dyn DatabaseDriver, dsn: &Dsn) -> Result<Arc<dyn Connection>> {
    let connecting = driver.connect(dsn);
    let result = match dsn.timeout() {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .unwrap_or_else(|_| {
                Err(DbPoolError::Connect(format!(
                    "timed out after {:?} connecting to {}",
                    limit,
                    dsn.address()
                )))
            }),
        None => connecting.await,
    };

    result.map_err(|e| match e {
        DbPoolError::Connect(_) => e,
        other => DbPoolError::Connect(other.to_string()),
    })
}

/// Owns the one shared connection pool of the process
pub struct ConnectionPoolManager {
    /// Driver registry
    registry: DriverRegistry,
    /// Where SQL log records are written
    log_sink: LogSink,
    /// Set exactly once by a successful `initialize`
    handle: OnceCell<Database>,
}

impl ConnectionPoolManager {
    /// Create a manager that resolves drivers from `registry`
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            log_sink: LogSink::stdout(),
            handle: OnceCell::new(),
        }
    }

    /// Create a manager with all built-in drivers registered
    pub fn with_defaults() -> Self {
        Self::new(DriverRegistry::with_defaults())
    }

    /// Write SQL log records to `sink` instead of stdout
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    /// Get the driver registry
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    /// Open the pool and publish its handle.
    ///
    /// Concurrent callers are serialized: one of them opens the pool and the
    /// rest receive the same handle. Once initialized, calling again with an
    /// identical config returns the existing handle; a different config fails
    /// with `AlreadyInitialized`. A failed attempt publishes nothing, so a
    /// later call may try again.
    #[tracing::instrument(skip(self, config), fields(max_open = config.max_open_conns, max_idle = config.max_idle_conns))]
    pub async fn initialize(&self, config: PoolConfig) -> Result<Database> {
        let database = self
            .handle
            .get_or_try_init(|| self.open(config.clone()))
            .await?;

        if database.config() != &config {
            tracing::warn!("connection pool already initialized with a different configuration");
            return Err(DbPoolError::AlreadyInitialized);
        }
        Ok(database.clone())
    }

    /// Get the shared handle
    pub fn get(&self) -> Result<Database> {
        self.handle.get().cloned().ok_or(DbPoolError::NotInitialized)
    }

    async fn open(&self, config: PoolConfig) -> Result<Database> {
        let dsn = Dsn::parse(&config.dsn).inspect_err(|e| {
            tracing::error!(error = %e, "invalid DSN");
        })?;
        let driver = self.registry.get(dsn.driver()).ok_or_else(|| {
            DbPoolError::Connect(format!("no driver registered for `{}`", dsn.driver()))
        })?;
        let logger = SqlLogger::new(config.logger_config(self.log_sink.clone()));

        tracing::info!(dsn = %dsn, driver = driver.name(), "opening connection pool");
        let first = connect_with_timeout(driver.as_ref(), &dsn)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to open database connection"))?;

        let limits = match config.limits() {
            Ok(limits) => limits,
            Err(e) => {
                tracing::error!(error = %e, "invalid pool limits");
                if let Err(close_err) = first.close().await {
                    tracing::warn!(error = %close_err, "failed to close connection");
                }
                return Err(e);
            }
        };

        let pool = ConnectionPool::new(
            limits,
            DriverConnectionFactory {
                driver,
                dsn: dsn.clone(),
            },
        );
        pool.seed(first);
        if pool.spawn_reaper().is_some() {
            tracing::debug!(interval = ?limits.reaper_interval(), "started idle connection reaper");
        }

        tracing::info!(
            max_open = limits.max_open(),
            max_idle = limits.max_idle(),
            max_lifetime = ?limits.max_lifetime(),
            "connection pool ready"
        );
        Ok(Database::new(pool, logger, config, dsn))
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests;
