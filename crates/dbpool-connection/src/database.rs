//! The shared pool handle
//!
//! A [`Database`] is what [`ConnectionPoolManager`](crate::ConnectionPoolManager)
//! publishes after a successful initialization. It is cheap to clone; all
//! clones share one pool. Statements run through it borrow a pooled
//! connection for their duration and are traced through the SQL logger.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dbpool_core::{DbPoolError, Dsn, QueryResult, Result, Row, SqlLogger, StatementResult, Value};
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::health::ping_database;
use crate::pool::{ConnectionPool, PoolLimits, PoolStats, PooledConnection};

struct DatabaseInner {
    pool: ConnectionPool,
    logger: SqlLogger,
    config: PoolConfig,
    dsn: Dsn,
}

/// Handle to the initialized connection pool
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub(crate) fn new(pool: ConnectionPool, logger: SqlLogger, config: PoolConfig, dsn: Dsn) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                pool,
                logger,
                config,
                dsn,
            }),
        }
    }

    /// The configuration this pool was initialized with
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn dsn(&self) -> &Dsn {
        &self.inner.dsn
    }

    pub fn limits(&self) -> &PoolLimits {
        self.inner.pool.limits()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    pub fn logger(&self) -> &SqlLogger {
        &self.inner.logger
    }

    /// Whether two handles share the same pool
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Borrow a dedicated connection, e.g. to run several statements on one
    /// session. Statements run on it directly are not traced.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.inner.pool.acquire().await
    }

    /// Run a statement that does not return rows
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.execute_with_cancel(sql, params, &CancellationToken::new())
            .await
    }

    /// Run a statement that does not return rows, aborting when `token` is cancelled
    pub async fn execute_with_cancel(
        &self,
        sql: &str,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<StatementResult> {
        let start = Instant::now();
        let result = self.run_execute(sql, params, token).await;
        let rows = result.as_ref().ok().map(|r| r.affected_rows);
        self.trace(start.elapsed(), sql, rows, result.as_ref().err());
        result
    }

    /// Run a query and collect its rows
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.query_with_cancel(sql, params, &CancellationToken::new())
            .await
    }

    /// Run a query and collect its rows, aborting when `token` is cancelled
    pub async fn query_with_cancel(
        &self,
        sql: &str,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<QueryResult> {
        let start = Instant::now();
        let result = self.run_query(sql, params, token).await;
        let rows = result.as_ref().ok().map(|r| r.row_count() as u64);
        self.trace(start.elapsed(), sql, rows, result.as_ref().err());
        result
    }

    /// Run a query expected to match a single row
    ///
    /// Returns `RecordNotFound` when the query matches nothing.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query_one_with_cancel(sql, params, &CancellationToken::new())
            .await
    }

    /// Run a single-row query, aborting when `token` is cancelled
    pub async fn query_one_with_cancel(
        &self,
        sql: &str,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<Row> {
        let start = Instant::now();
        let result = self
            .run_query(sql, params, token)
            .await
            .and_then(|r| r.into_first().ok_or(DbPoolError::RecordNotFound));
        let rows = result.as_ref().ok().map(|_| 1);
        self.trace(start.elapsed(), sql, rows, result.as_ref().err());
        result
    }

    /// Check that the server answers, returning the round-trip time
    pub async fn ping(&self) -> Result<Duration> {
        let conn = self.inner.pool.acquire().await?;
        let latency = ping_database(&*conn, self.limits().acquire_timeout()).await;
        if latency.is_err() {
            conn.discard();
        }
        latency
    }

    /// Close the pool; later statements fail with `PoolClosed`
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    async fn run_execute(
        &self,
        sql: &str,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<StatementResult> {
        let conn = self.checkout(token).await?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(abandon(&conn)),
            result = conn.execute(sql, params) => result,
        }
    }

    async fn run_query(
        &self,
        sql: &str,
        params: &[Value],
        token: &CancellationToken,
    ) -> Result<QueryResult> {
        let conn = self.checkout(token).await?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(abandon(&conn)),
            result = conn.query(sql, params) => result,
        }
    }

    async fn checkout(&self, token: &CancellationToken) -> Result<PooledConnection> {
        self.inner
            .pool
            .acquire_with(self.limits().acquire_timeout(), token)
            .await
    }

    fn trace(&self, elapsed: Duration, sql: &str, rows: Option<u64>, error: Option<&DbPoolError>) {
        self.inner.logger.trace(elapsed, sql, rows, error);
    }
}

/// A cancelled statement leaves the session in an unknown state
fn abandon(conn: &PooledConnection) -> DbPoolError {
    conn.discard();
    tracing::debug!("statement cancelled, discarding its connection");
    DbPoolError::Cancelled
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dsn", &self.inner.dsn.to_string())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
