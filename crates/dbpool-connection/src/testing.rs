//! In-memory driver used by the manager and database tests
//!
//! `MockDriver` registers under the `mysql` name so the usual go-style DSNs
//! resolve to it. Its connections share one key/value map:
//! - `execute` with `[key, value]` stores the pair
//! - `query` with `[key]` returns one `v` column row, or no rows
//! - `SELECT SLEEP` never finishes, `BOOM` fails with a query error

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbpool_core::{
    ColumnMeta, Connection, DatabaseDriver, DbPoolError, Dsn, QueryResult, Result, Row,
    StatementResult, Value,
};
use dbpool_drivers::DriverRegistry;
use parking_lot::Mutex;

pub(crate) const DSN: &str = "root:root@tcp(127.0.0.1:3306)/gorm?charset=utf8&parseTime=True&loc=Local&timeout=10ms";

pub(crate) struct MockConnection {
    store: Arc<Mutex<HashMap<String, String>>>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        if sql == "BOOM" {
            return Err(DbPoolError::Query("syntax error near BOOM".into()));
        }
        match params {
            [key, value] => {
                let key = key.to_string();
                self.store.lock().insert(key, value.to_string());
                Ok(StatementResult {
                    affected_rows: 1,
                    last_insert_id: None,
                })
            }
            _ => Ok(StatementResult::default()),
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        match sql {
            "BOOM" => return Err(DbPoolError::Query("syntax error near BOOM".into())),
            "SELECT SLEEP" => std::future::pending::<()>().await,
            _ => {}
        }

        let found = params
            .first()
            .and_then(|key| self.store.lock().get(&key.to_string()).cloned());
        let rows = found
            .map(|v| vec![Row::new(vec!["v".into()], vec![Value::String(v)])])
            .unwrap_or_default();

        Ok(QueryResult {
            columns: vec![ColumnMeta {
                name: "v".into(),
                data_type: "VARCHAR".into(),
                ordinal: 0,
            }],
            rows,
            execution_time_ms: 0,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct MockDriver {
    store: Arc<Mutex<HashMap<String, String>>>,
    connects: AtomicUsize,
    /// Simulated handshake time
    pub(crate) connect_delay: Mutex<Duration>,
    pub(crate) refuse: AtomicBool,
    pub(crate) connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| c.is_closed())
            .count()
    }

    pub(crate) fn registry(self: &Arc<Self>) -> DriverRegistry {
        let mut registry = DriverRegistry::new();
        registry.register(self.clone());
        registry
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self, _dsn: &Dsn) -> Result<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DbPoolError::Connect("connection refused".into()));
        }

        let conn = Arc::new(MockConnection {
            store: self.store.clone(),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Log sink whose contents the tests can read back
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Let background close tasks run
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
