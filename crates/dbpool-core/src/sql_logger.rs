//! SQL statement logging
//!
//! Every statement run through a pooled handle is traced here once, with its
//! elapsed time, row count and error. At most one record is written per
//! statement: an error record, else a slow-query record, else (at `Info`) a
//! plain record. Records go to a [`LogSink`] and are mirrored as `tracing`
//! events under the `dbpool::sql` target.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::DbPoolError;
use crate::duration::format_duration;

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE_BOLD: &str = "\x1b[34;1m";

/// SQL log verbosity, ordered from quietest to noisiest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Silent,
    Error,
    Warn,
    Info,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Silent => "silent",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            other => Err(format!("unknown log level `{}`", other)),
        }
    }
}

/// Shared writable stream that SQL log records are written to
#[derive(Clone)]
pub struct LogSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    fn write_record(&self, record: &str) {
        let mut writer = self.writer.lock();
        if let Err(err) = writer
            .write_all(record.as_bytes())
            .and_then(|()| writer.flush())
        {
            tracing::warn!(error = %err, "failed to write SQL log record");
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// Logger settings, fixed once the pool handle is created
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub sink: LogSink,
    /// Statements slower than this are reported at `Warn`; zero disables it
    pub slow_threshold: Duration,
    pub level: LogLevel,
    /// Keep "record not found" out of error records
    pub ignore_record_not_found: bool,
    /// Wrap record tags in ANSI colors
    pub colorful: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sink: LogSink::stdout(),
            slow_threshold: Duration::from_secs(1),
            level: LogLevel::Silent,
            ignore_record_not_found: true,
            colorful: false,
        }
    }
}

/// Which record, if any, a traced statement produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Error,
    Slow,
    Info,
}

/// Statement logger attached to a pool handle
#[derive(Debug, Clone)]
pub struct SqlLogger {
    config: LoggerConfig,
}

impl SqlLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn level(&self) -> LogLevel {
        self.config.level
    }

    /// Record one executed statement.
    ///
    /// `rows` is the returned or affected row count when the statement
    /// succeeded. Returns the kind of record written, if any.
    pub fn trace(
        &self,
        elapsed: Duration,
        sql: &str,
        rows: Option<u64>,
        error: Option<&DbPoolError>,
    ) -> Option<TraceKind> {
        let level = self.config.level;
        if level == LogLevel::Silent {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let rows_label = rows.map_or_else(|| "-".to_string(), |n| n.to_string());
        let threshold = self.config.slow_threshold;

        let kind = match error {
            Some(err)
                if level >= LogLevel::Error
                    && !(err.is_record_not_found() && self.config.ignore_record_not_found) =>
            {
                tracing::error!(target: "dbpool::sql", error = %err, elapsed_ms, rows = %rows_label, sql, "SQL error");
                self.write(TraceKind::Error, &err.to_string(), elapsed_ms, &rows_label, sql);
                TraceKind::Error
            }
            _ if !threshold.is_zero() && elapsed > threshold && level >= LogLevel::Warn => {
                let tag = format!("SLOW SQL >= {}", format_duration(threshold));
                tracing::warn!(target: "dbpool::sql", elapsed_ms, rows = %rows_label, sql, "slow SQL");
                self.write(TraceKind::Slow, &tag, elapsed_ms, &rows_label, sql);
                TraceKind::Slow
            }
            _ if level == LogLevel::Info => {
                tracing::info!(target: "dbpool::sql", elapsed_ms, rows = %rows_label, sql, "SQL");
                self.write(TraceKind::Info, "info", elapsed_ms, &rows_label, sql);
                TraceKind::Info
            }
            _ => return None,
        };
        Some(kind)
    }

    fn write(&self, kind: TraceKind, tag: &str, elapsed_ms: f64, rows: &str, sql: &str) {
        let timestamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
        let record = if self.config.colorful {
            let color = match kind {
                TraceKind::Error => RED,
                TraceKind::Slow => YELLOW,
                TraceKind::Info => GREEN,
            };
            format!(
                "{timestamp} {color}[{tag}]{RESET} {YELLOW}[{elapsed_ms:.3}ms]{RESET} {BLUE_BOLD}[rows:{rows}]{RESET} {sql}\n"
            )
        } else {
            format!("{timestamp} [{tag}] [{elapsed_ms:.3}ms] [rows:{rows}] {sql}\n")
        };
        self.config.sink.write_record(&record);
    }
}

#[cfg(test)]
mod tests;
