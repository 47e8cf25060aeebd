//! MySQL connection implementation

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use dbpool_core::{
    Address, ColumnMeta, Connection, DbPoolError, Dsn, Location, QueryResult, Result, Row,
    StatementResult, Value,
};
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row as MySqlRow, consts::ColumnType, prelude::*};
use tokio::sync::Mutex;

/// Options derived from the DSN, ready for `Conn::new`
pub fn build_opts(dsn: &Dsn) -> Opts {
    let mut builder = OptsBuilder::default()
        .user(dsn.user())
        .pass(dsn.password())
        .db_name(dsn.database())
        .prefer_socket(false);

    builder = match dsn.address() {
        Address::Tcp { host, port } => builder.ip_or_hostname(host.as_str()).tcp_port(*port),
        Address::Unix(path) => builder.socket(Some(path.to_string_lossy().into_owned())),
    };

    if let Some(charset) = dsn.charsets().first() {
        builder = builder.init(vec![format!("SET NAMES {}", charset)]);
    }

    builder.into()
}

type StatementFuture<'c, T> = Pin<Box<dyn Future<Output = mysql_async::Result<T>> + Send + 'c>>;

/// How DATE/DATETIME/TIMESTAMP columns are surfaced
#[derive(Debug, Clone, Copy)]
struct TimeHandling {
    parse_time: bool,
    location: Location,
}

/// A single physical MySQL connection.
///
/// The underlying `Conn` is kept behind an async mutex so the connection can be
/// shared as `Arc<dyn Connection>`; statements on it are serialized.
pub struct MySqlConnection {
    conn: Mutex<Option<Conn>>,
    closed: AtomicBool,
    time: TimeHandling,
    read_timeout: Option<Duration>,
}

impl MySqlConnection {
    /// Open a connection, bounded by the DSN `timeout`
    pub async fn connect(dsn: &Dsn) -> Result<Self> {
        tracing::info!(address = %dsn.address(), database = ?dsn.database(), "connecting to MySQL database");

        let opts = build_opts(dsn);
        let conn = match dsn.timeout() {
            Some(limit) => tokio::time::timeout(limit, Conn::new(opts))
                .await
                .map_err(|_| {
                    DbPoolError::Connect(format!(
                        "timed out after {:?} connecting to {}",
                        limit,
                        dsn.address()
                    ))
                })?,
            None => Conn::new(opts).await,
        }
        .map_err(|e| DbPoolError::Connect(format!("Failed to connect to MySQL: {}", e)))?;

        tracing::debug!(connection_id = conn.id(), "MySQL connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
            time: TimeHandling {
                parse_time: dsn.parse_time(),
                location: dsn.location(),
            },
            read_timeout: dsn.read_timeout(),
        })
    }

    /// Run `op` against the underlying connection, applying the read timeout
    /// and mapping driver errors.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Conn) -> StatementFuture<'c, T>,
    {
        if self.is_closed() {
            return Err(DbPoolError::Connect("MySQL connection is closed".into()));
        }

        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbPoolError::Connect("MySQL connection is closed".into()))?;

        let outcome = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, op(conn)).await {
                Ok(result) => result,
                Err(_) => {
                    self.mark_closed();
                    tracing::warn!(?limit, "MySQL statement exceeded read timeout");
                    return Err(DbPoolError::Timeout(format!(
                        "statement did not complete within {:?}",
                        limit
                    )));
                }
            },
            None => op(conn).await,
        };

        outcome.map_err(|e| self.map_error(e))
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn map_error(&self, err: mysql_async::Error) -> DbPoolError {
        match err {
            mysql_async::Error::Server(server) => {
                DbPoolError::Query(format!("MySQL error {}: {}", server.code, server.message))
            }
            mysql_async::Error::Io(io) => {
                self.mark_closed();
                DbPoolError::Connect(format!("MySQL I/O error: {}", io))
            }
            mysql_async::Error::Driver(driver) => DbPoolError::Driver(driver.to_string()),
            other => DbPoolError::Query(other.to_string()),
        }
    }
}

fn to_params(values: &[Value], time: TimeHandling) -> Result<Params> {
    if values.is_empty() {
        return Ok(Params::Empty);
    }
    values
        .iter()
        .map(|v| value_to_mysql(v, time))
        .collect::<Result<Vec<_>>>()
        .map(Params::Positional)
}

/// Years the DATE/DATETIME wire format can carry
fn wire_year(year: i32) -> Result<u16> {
    u16::try_from(year)
        .ok()
        .filter(|y| *y <= 9999)
        .ok_or_else(|| DbPoolError::Query(format!("year {} is out of range for MySQL", year)))
}

fn date_to_mysql(date: NaiveDate) -> Result<mysql_async::Value> {
    Ok(mysql_async::Value::Date(
        wire_year(date.year())?,
        date.month() as u8,
        date.day() as u8,
        0,
        0,
        0,
        0,
    ))
}

fn naive_to_mysql(dt: NaiveDateTime) -> Result<mysql_async::Value> {
    Ok(mysql_async::Value::Date(
        wire_year(dt.year())?,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    ))
}

/// Convert a bound parameter into its wire value
fn value_to_mysql(value: &Value, time: TimeHandling) -> Result<mysql_async::Value> {
    let wire = match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(i64::from(*v)),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::UInt64(v) => mysql_async::Value::UInt(*v),
        Value::Float32(v) => mysql_async::Value::Float(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) | Value::String(v) => mysql_async::Value::Bytes(v.as_bytes().to_vec()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Date(d) => date_to_mysql(*d)?,
        Value::DateTime(dt) => naive_to_mysql(*dt)?,
        Value::Timestamp(ts) => naive_to_mysql(time.location.to_naive(ts))?,
    };
    Ok(wire)
}

fn is_date_type(col_type: ColumnType) -> bool {
    matches!(
        col_type,
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
    )
}

fn is_datetime_type(col_type: ColumnType) -> bool {
    matches!(
        col_type,
        ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2
    )
}

/// Surface a wall-clock value read from the server
fn temporal_value(naive: NaiveDateTime, date_only: bool, time: TimeHandling) -> Value {
    if !time.parse_time {
        let text = if date_only {
            naive.date().format("%Y-%m-%d").to_string()
        } else {
            naive.format("%Y-%m-%d %H:%M:%S%.f").to_string()
        };
        return Value::String(text);
    }

    time.location
        .localize(naive)
        .map(Value::Timestamp)
        .unwrap_or(Value::DateTime(naive))
}

fn parse_text_temporal(s: &str, col_type: ColumnType) -> Option<NaiveDateTime> {
    if is_date_type(col_type) {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    } else {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()
    }
}

/// Convert a mysql_async value to our Value type, using column type metadata
/// to interpret byte strings from the text protocol.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType, time: TimeHandling) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => {
            let s = match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(e) => return Value::Bytes(e.into_bytes()),
            };
            match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => match s.parse::<i64>() {
                    Ok(v) => Value::Int64(v),
                    Err(_) => s.parse::<u64>().map(Value::UInt64).unwrap_or(Value::String(s)),
                },
                ColumnType::MYSQL_TYPE_FLOAT => {
                    s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                t if time.parse_time && (is_date_type(t) || is_datetime_type(t)) => {
                    match parse_text_temporal(&s, t) {
                        Some(naive) => temporal_value(naive, is_date_type(t), time),
                        // zero dates such as 0000-00-00 have no calendar value
                        None => Value::String(s),
                    }
                }
                _ => Value::String(s),
            }
        }
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => {
            if u <= i64::MAX as u64 {
                Value::Int64(u as i64)
            } else {
                Value::UInt64(u)
            }
        }
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let naive = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|d| d.and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro));
            match naive {
                Some(naive) => temporal_value(naive, is_date_type(col_type), time),
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn convert_rows(mysql_rows: Vec<MySqlRow>, time: TimeHandling) -> (Vec<ColumnMeta>, Vec<Row>) {
    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    let mut column_types = Vec::new();

    if let Some(first_row) = mysql_rows.first() {
        for (idx, col) in first_row.columns_ref().iter().enumerate() {
            let name = col.name_str().to_string();
            column_names.push(name.clone());
            column_types.push(col.column_type());
            columns.push(ColumnMeta {
                name,
                data_type: format!("{:?}", col.column_type()),
                ordinal: idx,
            });
        }
    }

    let rows = mysql_rows
        .into_iter()
        .map(|mut mysql_row| {
            let values = column_types
                .iter()
                .enumerate()
                .map(|(idx, col_type)| {
                    let raw: mysql_async::Value =
                        mysql_row.take(idx).unwrap_or(mysql_async::Value::NULL);
                    mysql_value_to_value(raw, *col_type, time)
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    (columns, rows)
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let params = to_params(params, self.time)?;
        let sql = sql.to_string();

        let result = self
            .with_conn(move |conn| {
                Box::pin(async move {
                    if matches!(params, Params::Empty) {
                        conn.query_drop(sql).await?;
                    } else {
                        conn.exec_drop(sql, params).await?;
                    }
                    Ok::<_, mysql_async::Error>(StatementResult {
                        affected_rows: conn.affected_rows(),
                        last_insert_id: conn.last_insert_id(),
                    })
                })
            })
            .await?;

        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = Instant::now();
        let params = to_params(params, self.time)?;
        let sql = sql.to_string();

        let mysql_rows: Vec<MySqlRow> = self
            .with_conn(move |conn| {
                Box::pin(async move {
                    if matches!(params, Params::Empty) {
                        conn.query::<MySqlRow, _>(sql).await
                    } else {
                        conn.exec::<MySqlRow, _, _>(sql, params).await
                    }
                })
            })
            .await?;

        let (columns, rows) = convert_rows(mysql_rows, self.time);
        tracing::debug!(row_count = rows.len(), "query executed");

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| Box::pin(conn.ping())).await
    }

    async fn close(&self) -> Result<()> {
        self.mark_closed();
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect()
                .await
                .map_err(|e| DbPoolError::Connect(format!("Failed to disconnect from MySQL: {}", e)))?;
            tracing::debug!("MySQL connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
