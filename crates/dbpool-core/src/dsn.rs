//! Data source names
//!
//! Accepts the go-sql-driver layout used by MySQL deployments:
//!
//! ```text
//! [driver://][user[:password]@][proto(address)|address][/database][?param=value&...]
//! ```
//!
//! e.g. `root:root@tcp(127.0.0.1:3306)/app?charset=utf8&parseTime=True&loc=Local&timeout=10ms`
//! or the bare-address form `root:root@127.0.0.1:3306/app`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

use crate::duration::{DurationError, format_duration, parse_duration};

/// Driver used when the DSN carries no `driver://` prefix
pub const DEFAULT_DRIVER: &str = "mysql";
/// Host used when the DSN has an empty address
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Port used when the address has none
pub const DEFAULT_PORT: u16 = 3306;
/// Socket used for `unix()` without a path
pub const DEFAULT_SOCKET: &str = "/tmp/mysql.sock";

/// Error returned when a DSN cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("missing the slash separating the database name")]
    MissingSlash,

    #[error("invalid driver scheme `{0}`")]
    InvalidScheme(String),

    #[error("unsupported network protocol `{0}`")]
    UnsupportedProtocol(String),

    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("invalid port `{0}`")]
    InvalidPort(String),

    #[error("invalid boolean `{value}` for parameter `{key}`")]
    InvalidBool { key: String, value: String },

    #[error("invalid duration for parameter `{key}`: {source}")]
    InvalidDuration {
        key: String,
        #[source]
        source: DurationError,
    },

    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),

    #[error("invalid charset `{0}`")]
    InvalidCharset(String),
}

/// Where the server is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp([{}]:{})", host, port)
            }
            Address::Tcp { host, port } => write!(f, "tcp({}:{})", host, port),
            Address::Unix(path) => write!(f, "unix({})", path.display()),
        }
    }
}

/// Time zone used to interpret DATETIME values (`loc` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Utc,
    Local,
    Named(chrono_tz::Tz),
}

impl Location {
    /// Attach this location to a wall-clock value read from the server.
    ///
    /// Returns `None` for local times that do not exist in the zone (DST gaps).
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Location::Utc => {
                let dt = Utc.from_utc_datetime(&naive);
                Some(dt.with_timezone(&dt.offset().fix()))
            }
            Location::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&dt.offset().fix())),
            Location::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&dt.offset().fix())),
        }
    }

    /// Wall-clock time of `instant` in this location, for sending to the server
    pub fn to_naive(&self, instant: &DateTime<FixedOffset>) -> NaiveDateTime {
        match self {
            Location::Utc => instant.naive_utc(),
            Location::Local => instant.with_timezone(&Local).naive_local(),
            Location::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Utc => write!(f, "UTC"),
            Location::Local => write!(f, "Local"),
            Location::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

impl FromStr for Location {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UTC" | "" => Ok(Location::Utc),
            "Local" => Ok(Location::Local),
            name => name
                .parse::<chrono_tz::Tz>()
                .map(Location::Named)
                .map_err(|_| DsnError::UnknownTimeZone(name.to_string())),
        }
    }
}

/// A parsed data source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    driver: String,
    user: Option<String>,
    password: Option<String>,
    address: Address,
    database: Option<String>,
    charsets: Vec<String>,
    parse_time: bool,
    location: Location,
    timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    params: BTreeMap<String, String>,
}

impl Dsn {
    /// Parse a DSN string
    pub fn parse(input: &str) -> Result<Self, DsnError> {
        let (driver, rest) = split_scheme(input.trim())?;

        // The database name follows the last slash; values that contain a
        // slash (e.g. `loc=Asia%2FShanghai`) must be percent-encoded.
        let slash = rest.rfind('/').ok_or(DsnError::MissingSlash)?;
        let (head, tail) = (&rest[..slash], &rest[slash + 1..]);

        let (userinfo, address) = match head.rfind('@') {
            Some(at) => (Some(&head[..at]), &head[at + 1..]),
            None => (None, head),
        };
        let (user, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, password)) => (non_empty(user), Some(password.to_string())),
                None => (non_empty(info), None),
            },
            None => (None, None),
        };

        let (database, query) = match tail.split_once('?') {
            Some((db, query)) => (db, Some(query)),
            None => (tail, None),
        };

        let mut dsn = Dsn {
            driver,
            user,
            password,
            address: parse_address(address)?,
            database: non_empty(database),
            charsets: Vec::new(),
            parse_time: false,
            location: Location::Utc,
            timeout: None,
            read_timeout: None,
            write_timeout: None,
            params: BTreeMap::new(),
        };

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                dsn.apply_param(&key, &value)?;
            }
        }

        Ok(dsn)
    }

    fn apply_param(&mut self, key: &str, value: &str) -> Result<(), DsnError> {
        match key {
            "charset" => {
                let charsets: Vec<String> = value.split(',').map(str::to_string).collect();
                if let Some(bad) = charsets.iter().find(|c| {
                    c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
                }) {
                    return Err(DsnError::InvalidCharset(bad.clone()));
                }
                self.charsets = charsets;
            }
            "parseTime" => self.parse_time = parse_bool(key, value)?,
            "loc" => self.location = value.parse()?,
            "timeout" => self.timeout = Some(parse_param_duration(key, value)?),
            "readTimeout" => self.read_timeout = Some(parse_param_duration(key, value)?),
            "writeTimeout" => self.write_timeout = Some(parse_param_duration(key, value)?),
            _ => {
                self.params.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Driver name (`mysql` unless the DSN starts with another `scheme://`)
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Character sets from `charset=`, in preference order
    pub fn charsets(&self) -> &[String] {
        &self.charsets
    }

    /// Whether DATE/DATETIME columns are decoded into time values (`parseTime`)
    pub fn parse_time(&self) -> bool {
        self.parse_time
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Dial timeout (`timeout`)
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// I/O read timeout (`readTimeout`)
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// I/O write timeout (`writeTimeout`)
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Parameters not interpreted by the DSN parser, passed through to drivers
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dsn::parse(s)
    }
}

/// Renders the DSN with the password masked, suitable for logs.
impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.driver != DEFAULT_DRIVER {
            write!(f, "{}://", self.driver)?;
        }
        if let Some(user) = &self.user {
            write!(f, "{}", user)?;
            if self.password.is_some() {
                write!(f, ":***")?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}/{}", self.address, self.database.as_deref().unwrap_or(""))?;

        let mut params = Vec::new();
        if !self.charsets.is_empty() {
            params.push(format!("charset={}", self.charsets.join(",")));
        }
        if self.parse_time {
            params.push("parseTime=true".to_string());
        }
        if self.location != Location::Utc {
            params.push(format!("loc={}", self.location));
        }
        for (key, value) in [
            ("timeout", self.timeout),
            ("readTimeout", self.read_timeout),
            ("writeTimeout", self.write_timeout),
        ] {
            if let Some(value) = value {
                params.push(format!("{}={}", key, format_duration(value)));
            }
        }
        params.extend(self.params.iter().map(|(k, v)| format!("{}={}", k, v)));

        if !params.is_empty() {
            write!(f, "?{}", params.join("&"))?;
        }
        Ok(())
    }
}

fn split_scheme(input: &str) -> Result<(String, &str), DsnError> {
    match input.split_once("://") {
        // Only treat it as a scheme when it precedes any credentials or path.
        Some((scheme, rest)) if !scheme.contains(['@', '/', '(']) => {
            if scheme.is_empty()
                || !scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '_')
            {
                return Err(DsnError::InvalidScheme(scheme.to_string()));
            }
            Ok((scheme.to_ascii_lowercase(), rest))
        }
        _ => Ok((DEFAULT_DRIVER.to_string(), input)),
    }
}

fn parse_address(raw: &str) -> Result<Address, DsnError> {
    let (protocol, address) = match raw.find('(') {
        Some(open) => {
            let inner = raw[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| DsnError::InvalidAddress(raw.to_string()))?;
            (&raw[..open], inner)
        }
        None => ("tcp", raw),
    };

    match protocol {
        "tcp" | "tcp4" | "tcp6" => parse_host_port(address),
        "unix" => Ok(Address::Unix(PathBuf::from(if address.is_empty() {
            DEFAULT_SOCKET
        } else {
            address
        }))),
        other => Err(DsnError::UnsupportedProtocol(other.to_string())),
    }
}

fn parse_host_port(address: &str) -> Result<Address, DsnError> {
    if address.is_empty() {
        return Ok(Address::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        });
    }

    let (host, port) = if let Some(bracketed) = address.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| DsnError::InvalidAddress(address.to_string()))?;
        match rest {
            "" => (host, None),
            _ => match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(DsnError::InvalidAddress(address.to_string())),
            },
        }
    } else {
        match address.rsplit_once(':') {
            // A bare IPv6 literal has several colons and no port.
            Some((host, _)) if host.contains(':') => (address, None),
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        }
    };

    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| DsnError::InvalidPort(port.to_string()))?,
        None => DEFAULT_PORT,
    };
    let host = if host.is_empty() { DEFAULT_HOST } else { host };

    Ok(Address::Tcp {
        host: host.to_string(),
        port,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DsnError> {
    match value {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(DsnError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_param_duration(key: &str, value: &str) -> Result<Duration, DsnError> {
    parse_duration(value).map_err(|source| DsnError::InvalidDuration {
        key: key.to_string(),
        source,
    })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests;
