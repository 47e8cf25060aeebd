//! Process logging setup
//!
//! The pool and its drivers emit `tracing` events (SQL records are mirrored
//! under the `dbpool::sql` target). This module installs a subscriber for
//! applications that do not bring their own:
//! - a console layer, pretty in development
//! - an optional JSON file layer with daily rotation
//!
//! `RUST_LOG` takes precedence over the configured filter.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,

    /// Whether to write JSON logs to files
    pub enable_json_logs: bool,

    /// Whether to write to the console
    pub enable_console_logs: bool,

    /// Multi-line console output with colors
    pub pretty_console: bool,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close (for timing)
    pub enable_spans: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            enable_console_logs: true,
            pretty_console: cfg!(debug_assertions),
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "info,dbpool::sql=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Production configuration: compact console output plus JSON files
    pub fn production() -> Self {
        Self {
            enable_json_logs: true,
            pretty_console: false,
            include_location: false,
            default_filter: "warn,dbpool_connection=info,dbpool_driver_mysql=info".to_string(),
            ..Self::default()
        }
    }

    /// Development configuration: pretty console output, verbose logging
    pub fn development() -> Self {
        Self {
            pretty_console: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug,dbpool_core=debug,dbpool_connection=debug,dbpool_driver_mysql=debug,mysql_async=info"
                .to_string(),
            ..Self::default()
        }
    }

    /// Testing configuration: console only, no files
    pub fn testing() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("dbpool-tests"),
            enable_json_logs: false,
            enable_console_logs: true,
            pretty_console: false,
            include_location: true,
            enable_spans: false,
            default_filter: "debug".to_string(),
        }
    }
}

/// Keeps the background file writer alive; logs written after it is dropped
/// may be lost.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set or the log directory cannot
/// be created.
pub fn init(config: LoggingConfig) -> anyhow::Result<LoggingGuard> {
    // Each layer gets its own filter instance
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.default_filter))
            .with_context(|| format!("invalid log filter `{}`", config.default_filter))
    };

    // NEW fires once when the span is created; ENTER would fire on every async
    // re-poll of an instrumented future.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    if config.enable_console_logs {
        let console = fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone());
        let console = if config.pretty_console {
            console.with_ansi(true).pretty().with_filter(env_filter()?).boxed()
        } else {
            console.with_ansi(false).compact().with_filter(env_filter()?).boxed()
        };
        layers.push(console);
    }

    let mut file_writer = None;
    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("failed to create log directory {}", config.log_dir.display())
        })?;

        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "dbpool.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_writer = Some(guard);

        let json = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter()?)
            .boxed();
        layers.push(json);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        console_enabled = config.enable_console_logs,
        "logging initialized"
    );

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbpool")
        .join("logs")
}
