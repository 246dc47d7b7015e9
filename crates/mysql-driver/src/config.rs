//! Driver configuration.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! `MYSQL_*` environment variables, and whatever the caller sets explicitly
//! (builder methods or a connection string).
//!
//! ```rust,ignore
//! let config = DriverConfig::from_env()?
//!     .apply_connection_string("Database=analytics;StoreTimezone=+05:00")?
//!     .max_pool(4);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use mysql_driver_pool::PoolConfig;
use mysql_session::{ConnectOptions, Credentials, SslOptions};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DriverError, Result};

/// Session time zone used when none is configured.
pub const DEFAULT_STORE_TIMEZONE: &str = "+00:00";

/// Environment variable names read by [`DriverConfig::from_env`].
pub mod env {
    /// Server hostname.
    pub const HOST: &str = "MYSQL_HOST";
    /// Database name.
    pub const DATABASE: &str = "MYSQL_DATABASE";
    /// Server port.
    pub const PORT: &str = "MYSQL_PORT";
    /// User name.
    pub const USER: &str = "MYSQL_USER";
    /// Password.
    pub const PASSWORD: &str = "MYSQL_PASSWORD";
    /// Unix socket path.
    pub const SOCKET_PATH: &str = "MYSQL_SOCKET_PATH";
    /// Maximum live sessions.
    pub const MAX_POOL: &str = "MYSQL_MAX_POOL";
    /// Enable TLS.
    pub const SSL: &str = "MYSQL_SSL";
    /// Verify the server certificate.
    pub const SSL_REJECT_UNAUTHORIZED: &str = "MYSQL_SSL_REJECT_UNAUTHORIZED";
    /// CA bundle path.
    pub const SSL_CA: &str = "MYSQL_SSL_CA";
    /// Client certificate path.
    pub const SSL_CERT: &str = "MYSQL_SSL_CERT";
    /// Client key path.
    pub const SSL_KEY: &str = "MYSQL_SSL_KEY";
}

/// Configuration for a [`Driver`](crate::Driver).
///
/// This struct is marked `#[non_exhaustive]`; construct it with
/// [`DriverConfig::new()`], [`DriverConfig::from_env()`] or
/// [`DriverConfig::from_connection_string()`].
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct DriverConfig {
    /// Options for every session.
    pub connect: ConnectOptions,

    /// Session time zone applied before each query (default: `+00:00`).
    pub store_timezone: Option<String>,

    /// Pool sizing and timeouts.
    pub pool: PoolConfig,
}

impl DriverConfig {
    /// Create a configuration with default values, ignoring the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the `MYSQL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if a numeric or boolean variable does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if a numeric or boolean variable does
    /// not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get(env::HOST) {
            config.connect.host = host;
        }
        if let Some(port) = get(env::PORT) {
            config.connect.port = parse_number(env::PORT, &port)?;
        }
        if let Some(database) = get(env::DATABASE) {
            config.connect.database = Some(database);
        }
        if let Some(user) = get(env::USER) {
            config.connect.credentials.user = user.into();
        }
        if let Some(password) = get(env::PASSWORD) {
            config.connect.credentials.password = password.into();
        }
        if let Some(path) = get(env::SOCKET_PATH) {
            config.connect.socket_path = Some(PathBuf::from(path));
        }
        if let Some(max) = get(env::MAX_POOL) {
            config.pool.max_connections = parse_number(env::MAX_POOL, &max)?;
        }

        let ssl_enabled = match get(env::SSL) {
            Some(value) => parse_bool(env::SSL, &value)?,
            None => false,
        };
        if ssl_enabled {
            let mut ssl = SslOptions::verified();
            if let Some(value) = get(env::SSL_REJECT_UNAUTHORIZED) {
                ssl.reject_unauthorized = parse_bool(env::SSL_REJECT_UNAUTHORIZED, &value)?;
            }
            ssl.ca = get(env::SSL_CA).map(PathBuf::from);
            ssl.cert = get(env::SSL_CERT).map(PathBuf::from);
            ssl.key = get(env::SSL_KEY).map(PathBuf::from);
            config.connect.ssl = Some(ssl);
        }

        Ok(config)
    }

    /// Parse a connection string on top of the defaults.
    ///
    /// # Errors
    ///
    /// See [`apply_connection_string`](Self::apply_connection_string).
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        Self::new().apply_connection_string(conn_str)
    }

    /// Override settings from a connection string.
    ///
    /// Format: `Host=db;Port=3306;Database=app;User=u;Password=p;...`. Keys
    /// are case-insensitive. Recognized keys: `Host`/`Server`, `Port`,
    /// `Database`, `User`/`User Id`, `Password`/`Pwd`, `SocketPath`,
    /// `StoreTimezone`, `DateStrings`, `MaxPool`, `AcquireTimeout` (seconds).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] for malformed pairs or values, and
    /// [`DriverError::InvalidTimeZone`] for an unusable `StoreTimezone`.
    pub fn apply_connection_string(mut self, conn_str: &str) -> Result<Self> {
        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| DriverError::Config(format!("invalid key-value: {part}")))?;
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" => self.connect.host = value.to_string(),
                "port" => self.connect.port = parse_number("Port", value)?,
                "database" => self.connect.database = Some(value.to_string()),
                "user" | "user id" | "uid" => {
                    self.connect.credentials.user = value.to_string().into();
                }
                "password" | "pwd" => {
                    self.connect.credentials.password = value.to_string().into();
                }
                "socketpath" | "socket path" => {
                    self.connect.socket_path = Some(PathBuf::from(value));
                }
                "storetimezone" | "store timezone" => {
                    validate_time_zone(value)?;
                    self.store_timezone = Some(value.to_string());
                }
                "datestrings" | "date strings" => {
                    self.connect.date_strings = parse_bool("DateStrings", value)?;
                }
                "maxpool" | "max pool" => {
                    self.pool.max_connections = parse_number("MaxPool", value)?;
                }
                "acquiretimeout" | "acquire timeout" => {
                    let secs: u64 = parse_number("AcquireTimeout", value)?;
                    self.pool.acquire_timeout = Duration::from_secs(secs);
                }
                _ => {
                    tracing::debug!(key = key.as_str(), "ignoring unknown connection string key");
                }
            }
        }
        Ok(self)
    }

    /// Replace the session options.
    #[must_use]
    pub fn connect(mut self, options: ConnectOptions) -> Self {
        self.connect = options;
        self
    }

    /// Set the server hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.connect.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.connect.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.connect.database = Some(database.into());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.connect.credentials = credentials;
        self
    }

    /// Connect through a Unix socket.
    #[must_use]
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.connect.socket_path = Some(path.into());
        self
    }

    /// Set the TLS options.
    #[must_use]
    pub fn ssl(mut self, ssl: SslOptions) -> Self {
        self.connect.ssl = Some(ssl);
        self
    }

    /// Set the session time zone applied before every query.
    #[must_use]
    pub fn store_timezone(mut self, tz: impl Into<String>) -> Self {
        self.store_timezone = Some(tz.into());
        self
    }

    /// Set the maximum number of live sessions.
    #[must_use]
    pub fn max_pool(mut self, max: u32) -> Self {
        self.pool.max_connections = max;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool.acquire_timeout = timeout;
        self
    }

    /// Replace the pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// The session time zone, falling back to [`DEFAULT_STORE_TIMEZONE`].
    #[must_use]
    pub fn effective_timezone(&self) -> &str {
        self.store_timezone.as_deref().unwrap_or(DEFAULT_STORE_TIMEZONE)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidTimeZone`] or a wrapped
    /// [`PoolError::Configuration`](mysql_driver_pool::PoolError::Configuration).
    pub fn validate(&self) -> Result<()> {
        validate_time_zone(self.effective_timezone())?;
        self.pool.validate()?;
        Ok(())
    }
}

/// Check that `tz` is a MySQL time zone value safe to interpolate.
///
/// Accepts `±HH:MM` offsets, `SYSTEM`, and named zones such as `UTC` or
/// `America/New_York`.
///
/// # Errors
///
/// Returns [`DriverError::InvalidTimeZone`] otherwise.
pub fn validate_time_zone(tz: &str) -> Result<()> {
    #[allow(clippy::expect_used)]
    static TIME_ZONE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:[+-](?:0\d|1[0-4]):[0-5]\d|[A-Za-z][A-Za-z0-9_+\-]*(?:/[A-Za-z0-9_+\-]+){0,2})$")
            .expect("time zone pattern is valid")
    });

    if TIME_ZONE_RE.is_match(tz) {
        Ok(())
    } else {
        Err(DriverError::InvalidTimeZone(format!(
            "'{tz}': expected an offset like +05:00, SYSTEM, or a zone name"
        )))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DriverError::Config(format!("invalid {key}: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(DriverError::Config(format!("invalid {key}: {value}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DriverConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.connect.host, "localhost");
        assert_eq!(config.connect.port, 3306);
        assert_eq!(config.connect.timezone, "Z");
        assert!(config.connect.date_strings);
        assert_eq!(config.pool.max_connections, 8);
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(20));
        assert_eq!(config.effective_timezone(), "+00:00");
        assert!(config.connect.ssl.is_none());
    }

    #[test]
    fn test_environment_values() {
        let config = DriverConfig::from_lookup(lookup(&[
            ("MYSQL_HOST", "db.internal"),
            ("MYSQL_PORT", "3307"),
            ("MYSQL_DATABASE", "analytics"),
            ("MYSQL_USER", "reader"),
            ("MYSQL_PASSWORD", "secret"),
            ("MYSQL_MAX_POOL", "16"),
        ]))
        .unwrap();

        assert_eq!(config.connect.host, "db.internal");
        assert_eq!(config.connect.port, 3307);
        assert_eq!(config.connect.database.as_deref(), Some("analytics"));
        assert_eq!(config.connect.credentials.user, "reader");
        assert_eq!(config.connect.credentials.password, "secret");
        assert_eq!(config.pool.max_connections, 16);
    }

    #[test]
    fn test_environment_ssl() {
        let config = DriverConfig::from_lookup(lookup(&[
            ("MYSQL_SSL", "true"),
            ("MYSQL_SSL_REJECT_UNAUTHORIZED", "false"),
            ("MYSQL_SSL_CA", "/etc/ssl/ca.pem"),
        ]))
        .unwrap();

        let ssl = config.connect.ssl.unwrap();
        assert!(ssl.enabled);
        assert!(!ssl.reject_unauthorized);
        assert_eq!(ssl.ca, Some(PathBuf::from("/etc/ssl/ca.pem")));
        assert!(ssl.cert.is_none());
    }

    #[test]
    fn test_environment_invalid_port() {
        let err = DriverConfig::from_lookup(lookup(&[("MYSQL_PORT", "abc")])).unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("MYSQL_PORT")));
    }

    #[test]
    fn test_empty_variable_ignored() {
        let config = DriverConfig::from_lookup(lookup(&[("MYSQL_HOST", "")])).unwrap();
        assert_eq!(config.connect.host, "localhost");
    }

    #[test]
    fn test_connection_string_overrides_environment() {
        let config = DriverConfig::from_lookup(lookup(&[
            ("MYSQL_HOST", "env-host"),
            ("MYSQL_DATABASE", "env-db"),
        ]))
        .unwrap()
        .apply_connection_string(
            "Host=explicit;Port=3310;StoreTimezone=+05:00;MaxPool=2;AcquireTimeout=5;DateStrings=false",
        )
        .unwrap();

        assert_eq!(config.connect.host, "explicit");
        assert_eq!(config.connect.port, 3310);
        assert_eq!(config.connect.database.as_deref(), Some("env-db"));
        assert_eq!(config.effective_timezone(), "+05:00");
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(5));
        assert!(!config.connect.date_strings);
    }

    #[test]
    fn test_connection_string_rejects_garbage() {
        assert!(DriverConfig::from_connection_string("Host").is_err());
        assert!(DriverConfig::from_connection_string("Port=none").is_err());
        assert!(matches!(
            DriverConfig::from_connection_string("StoreTimezone=x'; DROP TABLE t; --"),
            Err(DriverError::InvalidTimeZone(_))
        ));
    }

    #[test]
    fn test_time_zone_validation() {
        for tz in ["+00:00", "-08:00", "+14:00", "SYSTEM", "UTC", "Europe/Berlin", "America/Argentina/Salta"] {
            assert!(validate_time_zone(tz).is_ok(), "{tz} should be accepted");
        }
        for tz in ["", "+5:00", "+25:00", "UTC'", "a b", "/etc/passwd"] {
            assert!(validate_time_zone(tz).is_err(), "{tz} should be rejected");
        }
    }

    #[test]
    fn test_validate_pool_settings() {
        let config = DriverConfig::new().max_pool(0);
        assert!(matches!(config.validate(), Err(DriverError::Pool(_))));

        let config = DriverConfig::new().store_timezone("nope'");
        assert!(matches!(config.validate(), Err(DriverError::InvalidTimeZone(_))));
    }
}
