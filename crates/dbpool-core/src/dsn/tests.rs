//! Tests for DSN parsing

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use super::*;
use crate::DbPoolError;
use crate::duration::DurationError;

fn tcp(host: &str, port: u16) -> Address {
    Address::Tcp {
        host: host.to_string(),
        port,
    }
}

#[test]
fn test_parse_go_driver_form() {
    let dsn = Dsn::parse(
        "root:root@tcp(127.0.0.1:3306)/gorm?charset=utf8&parseTime=True&loc=Local&timeout=10ms",
    )
    .expect("parse");

    assert_eq!(dsn.driver(), "mysql");
    assert_eq!(dsn.user(), Some("root"));
    assert_eq!(dsn.password(), Some("root"));
    assert_eq!(dsn.address(), &tcp("127.0.0.1", 3306));
    assert_eq!(dsn.database(), Some("gorm"));
    assert_eq!(dsn.charsets(), &["utf8".to_string()]);
    assert!(dsn.parse_time());
    assert_eq!(dsn.location(), Location::Local);
    assert_eq!(dsn.timeout(), Some(Duration::from_millis(10)));
    assert_eq!(dsn.read_timeout(), None);
    assert!(dsn.params().is_empty());
}

#[test]
fn test_parse_bare_address_form() {
    let dsn = Dsn::parse("app:secret@db.internal:3307/orders").expect("parse");
    assert_eq!(dsn.address(), &tcp("db.internal", 3307));
    assert_eq!(dsn.database(), Some("orders"));
    assert!(!dsn.parse_time());
    assert_eq!(dsn.location(), Location::Utc);
}

#[test]
fn test_password_may_contain_separators() {
    let dsn = Dsn::parse("user:p@ss:w0rd@tcp(localhost)/db").expect("parse");
    assert_eq!(dsn.user(), Some("user"));
    assert_eq!(dsn.password(), Some("p@ss:w0rd"));
    assert_eq!(dsn.address(), &tcp("localhost", DEFAULT_PORT));
}

#[test]
fn test_parse_unix_socket() {
    let dsn = Dsn::parse("root@unix(/var/run/mysqld/mysqld.sock)/app").expect("parse");
    assert_eq!(
        dsn.address(),
        &Address::Unix(PathBuf::from("/var/run/mysqld/mysqld.sock"))
    );
    assert_eq!(dsn.password(), None);
}

#[test]
fn test_parse_ipv6_and_empty_address() {
    let dsn = Dsn::parse("root@tcp([::1]:3307)/db").expect("parse");
    assert_eq!(dsn.address(), &tcp("::1", 3307));

    let dsn = Dsn::parse("/db").expect("parse");
    assert_eq!(dsn.user(), None);
    assert_eq!(dsn.address(), &tcp(DEFAULT_HOST, DEFAULT_PORT));
    assert_eq!(dsn.database(), Some("db"));
}

#[test]
fn test_driver_scheme_prefix() {
    let dsn = Dsn::parse("Mock://tester@tcp(db:1)/kv").expect("parse");
    assert_eq!(dsn.driver(), "mock");
    assert_eq!(dsn.user(), Some("tester"));

    assert_eq!(
        Dsn::parse("my sql://root@tcp(db)/kv"),
        Err(DsnError::InvalidScheme("my sql".into()))
    );
}

#[test]
fn test_timeouts_and_passthrough_params() {
    let dsn = Dsn::parse(
        "root@tcp(db)/app?readTimeout=1m30s&writeTimeout=2s&allowNativePasswords=true&loc=Asia%2FShanghai",
    )
    .expect("parse");
    assert_eq!(dsn.read_timeout(), Some(Duration::from_secs(90)));
    assert_eq!(dsn.write_timeout(), Some(Duration::from_secs(2)));
    assert_eq!(dsn.param("allowNativePasswords"), Some("true"));
    assert_eq!(dsn.location(), Location::Named(chrono_tz::Asia::Shanghai));
}

#[test]
fn test_parse_errors() {
    assert_eq!(
        Dsn::parse("root:root@localhost"),
        Err(DsnError::MissingSlash)
    );
    assert_eq!(
        Dsn::parse("root@tcp(localhost:99999)/db"),
        Err(DsnError::InvalidPort("99999".into()))
    );
    assert_eq!(
        Dsn::parse("root@tcp(localhost/db"),
        Err(DsnError::InvalidAddress("tcp(localhost".into()))
    );
    assert_eq!(
        Dsn::parse("root@udp(localhost)/db"),
        Err(DsnError::UnsupportedProtocol("udp".into()))
    );
    assert_eq!(
        Dsn::parse("root@tcp(db)/app?parseTime=yes"),
        Err(DsnError::InvalidBool {
            key: "parseTime".into(),
            value: "yes".into()
        })
    );
    assert_eq!(
        Dsn::parse("root@tcp(db)/app?timeout=10"),
        Err(DsnError::InvalidDuration {
            key: "timeout".into(),
            source: DurationError::MissingUnit("10".into())
        })
    );
    assert_eq!(
        Dsn::parse("root@tcp(db)/app?loc=Mars%2FBase"),
        Err(DsnError::UnknownTimeZone("Mars/Base".into()))
    );
    assert_eq!(
        Dsn::parse("root@tcp(db)/app?charset=utf8;DROP"),
        Err(DsnError::InvalidCharset("utf8;DROP".into()))
    );
}

#[test]
fn test_display_masks_password() {
    let dsn = Dsn::parse(
        "root:hunter2@tcp(127.0.0.1:3306)/gorm?charset=utf8mb4,utf8&parseTime=True&loc=Local&timeout=10ms",
    )
    .expect("parse");
    let shown = dsn.to_string();
    assert!(!shown.contains("hunter2"));
    assert_eq!(
        shown,
        "root:***@tcp(127.0.0.1:3306)/gorm?charset=utf8mb4,utf8&parseTime=true&loc=Local&timeout=10ms"
    );
}

#[test]
fn test_dsn_error_becomes_connect_error() {
    let err: DbPoolError = Dsn::parse("nonsense").unwrap_err().into();
    assert!(matches!(err, DbPoolError::Connect(msg) if msg.contains("missing the slash")));
}

#[test]
fn test_location_round_trips_wall_clock() {
    let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();

    let utc = Location::Utc.localize(naive).expect("utc");
    assert_eq!(utc.offset().local_minus_utc(), 0);
    assert_eq!(Location::Utc.to_naive(&utc), naive);

    let shanghai = Location::Named(chrono_tz::Asia::Shanghai);
    let localized = shanghai.localize(naive).expect("shanghai");
    assert_eq!(localized.offset().local_minus_utc(), 8 * 3600);
    assert_eq!(shanghai.to_naive(&localized), naive);
}
