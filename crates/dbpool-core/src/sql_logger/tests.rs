//! Tests for SQL statement logging

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::DbPoolError;

/// In-memory sink shared between the logger and the assertions
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).expect("utf8 log output")
    }

    fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn make_logger(level: LogLevel, ignore_not_found: bool) -> (SqlLogger, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let logger = SqlLogger::new(LoggerConfig {
        sink: LogSink::new(buffer.clone()),
        slow_threshold: Duration::from_millis(100),
        level,
        ignore_record_not_found: ignore_not_found,
        colorful: false,
    });
    (logger, buffer)
}

const SQL: &str = "SELECT v FROM kv WHERE k = ?";

#[test]
fn test_silent_writes_nothing() {
    let (logger, buffer) = make_logger(LogLevel::Silent, true);
    let err = DbPoolError::Query("boom".into());

    assert_eq!(logger.trace(Duration::from_secs(5), SQL, None, Some(&err)), None);
    assert_eq!(logger.trace(Duration::from_secs(5), SQL, Some(1), None), None);
    assert!(buffer.contents().is_empty());
}

#[test]
fn test_slow_query_emits_exactly_one_record() {
    let (logger, buffer) = make_logger(LogLevel::Warn, true);

    let kind = logger.trace(Duration::from_millis(250), SQL, Some(3), None);

    assert_eq!(kind, Some(TraceKind::Slow));
    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("[SLOW SQL >= 100ms]"), "{}", lines[0]);
    assert!(lines[0].contains("[rows:3]"));
    assert!(lines[0].ends_with(SQL));
}

#[test]
fn test_fast_query_below_info_is_not_logged() {
    let (logger, buffer) = make_logger(LogLevel::Warn, true);
    assert_eq!(logger.trace(Duration::from_millis(5), SQL, Some(1), None), None);
    assert!(buffer.contents().is_empty());
}

#[test]
fn test_error_wins_over_slow() {
    let (logger, buffer) = make_logger(LogLevel::Info, true);
    let err = DbPoolError::Query("Unknown column 'v'".into());

    let kind = logger.trace(Duration::from_secs(2), SQL, None, Some(&err));

    assert_eq!(kind, Some(TraceKind::Error));
    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("[Query error: Unknown column 'v']"));
    assert!(lines[0].contains("[rows:-]"));
}

#[test]
fn test_record_not_found_is_not_an_error_record_when_ignored() {
    let (logger, buffer) = make_logger(LogLevel::Error, true);
    let kind = logger.trace(
        Duration::from_millis(1),
        SQL,
        None,
        Some(&DbPoolError::RecordNotFound),
    );
    assert_eq!(kind, None);
    assert!(buffer.contents().is_empty());

    let (logger, buffer) = make_logger(LogLevel::Error, false);
    let kind = logger.trace(
        Duration::from_millis(1),
        SQL,
        None,
        Some(&DbPoolError::RecordNotFound),
    );
    assert_eq!(kind, Some(TraceKind::Error));
    assert_eq!(buffer.lines().len(), 1);
}

#[test]
fn test_ignored_not_found_still_reports_slowness() {
    let (logger, buffer) = make_logger(LogLevel::Warn, true);
    let kind = logger.trace(
        Duration::from_millis(500),
        SQL,
        None,
        Some(&DbPoolError::RecordNotFound),
    );
    assert_eq!(kind, Some(TraceKind::Slow));
    assert_eq!(buffer.lines().len(), 1);
}

#[test]
fn test_info_logs_every_statement() {
    let (logger, buffer) = make_logger(LogLevel::Info, true);
    logger.trace(Duration::from_millis(2), "INSERT INTO kv VALUES (?, ?)", Some(1), None);
    logger.trace(Duration::from_millis(3), SQL, Some(1), None);

    let lines = buffer.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.contains("[info]")));
}

#[test]
fn test_zero_threshold_disables_slow_detection() {
    let buffer = SharedBuffer::default();
    let logger = SqlLogger::new(LoggerConfig {
        sink: LogSink::new(buffer.clone()),
        slow_threshold: Duration::ZERO,
        level: LogLevel::Warn,
        ignore_record_not_found: true,
        colorful: false,
    });
    assert_eq!(logger.trace(Duration::from_secs(60), SQL, Some(0), None), None);
    assert!(buffer.contents().is_empty());
}

#[test]
fn test_colorful_records_use_ansi_codes() {
    let buffer = SharedBuffer::default();
    let logger = SqlLogger::new(LoggerConfig {
        sink: LogSink::new(buffer.clone()),
        level: LogLevel::Error,
        colorful: true,
        ..LoggerConfig::default()
    });
    logger.trace(
        Duration::from_millis(1),
        SQL,
        None,
        Some(&DbPoolError::Query("boom".into())),
    );
    assert!(buffer.contents().contains("\x1b[31m[Query error: boom]\x1b[0m"));
}

#[test]
fn test_log_level_parsing_and_order() {
    assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
    assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
    assert_eq!("off".parse::<LogLevel>(), Ok(LogLevel::Silent));
    assert!("loud".parse::<LogLevel>().is_err());

    assert!(LogLevel::Silent < LogLevel::Error);
    assert!(LogLevel::Warn < LogLevel::Info);
    assert_eq!(LogLevel::default(), LogLevel::Silent);
    assert_eq!(
        serde_json::to_string(&LogLevel::Warn).expect("serialize"),
        "\"warn\""
    );
}
