//! Session connect options.

use std::borrow::Cow;
use std::path::PathBuf;

/// Default MySQL TCP port.
pub const DEFAULT_PORT: u16 = 3306;

/// Time zone used for wire-level timestamp conversion.
///
/// Timestamps are always exchanged in UTC; the display zone of a session is
/// set separately with `SET time_zone`.
pub const WIRE_TIMEZONE: &str = "Z";

/// User name and password for MySQL native authentication.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub user: Cow<'static, str>,
    /// Password.
    pub password: Cow<'static, str>,
}

impl Credentials {
    /// Create credentials from a user name and password.
    pub fn new(user: impl Into<Cow<'static, str>>, password: impl Into<Cow<'static, str>>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the password in debug output
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// TLS settings handed to the client as-is.
///
/// Deriving these from environment or certificate stores is the client's
/// business; the pool only carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct SslOptions {
    /// Whether to negotiate TLS at all.
    pub enabled: bool,
    /// Reject servers whose certificate does not verify.
    pub reject_unauthorized: bool,
    /// CA bundle path.
    pub ca: Option<PathBuf>,
    /// Client certificate path.
    pub cert: Option<PathBuf>,
    /// Client key path.
    pub key: Option<PathBuf>,
}

impl SslOptions {
    /// TLS enabled with certificate verification.
    #[must_use]
    pub fn verified() -> Self {
        Self {
            enabled: true,
            reject_unauthorized: true,
            ..Self::default()
        }
    }

    /// Set the CA bundle path.
    #[must_use]
    pub fn ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca = Some(path.into());
        self
    }

    /// Set the client certificate and key paths.
    #[must_use]
    pub fn client_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Enable or disable certificate verification.
    #[must_use]
    pub fn reject_unauthorized(mut self, enabled: bool) -> Self {
        self.reject_unauthorized = enabled;
        self
    }
}

/// Options for opening one session.
///
/// This struct is marked `#[non_exhaustive]`; construct it with
/// [`ConnectOptions::new()`] and the builder methods.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConnectOptions {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3306).
    pub port: u16,

    /// Database name.
    pub database: Option<String>,

    /// Authentication credentials.
    pub credentials: Credentials,

    /// Unix socket path. When set it takes precedence over host and port.
    pub socket_path: Option<PathBuf>,

    /// Wire-level time zone, fixed to [`WIRE_TIMEZONE`].
    pub timezone: String,

    /// TLS configuration.
    pub ssl: Option<SslOptions>,

    /// Return DATE/DATETIME columns as literal strings instead of parsed values.
    pub date_strings: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: None,
            credentials: Credentials::default(),
            socket_path: None,
            timezone: WIRE_TIMEZONE.to_string(),
            ssl: None,
            date_strings: true,
        }
    }
}

impl ConnectOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the Unix socket path.
    #[must_use]
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Set the TLS options.
    #[must_use]
    pub fn ssl(mut self, ssl: SslOptions) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Enable or disable returning date/time columns as strings.
    #[must_use]
    pub fn date_strings(mut self, enabled: bool) -> Self {
        self.date_strings = enabled;
        self
    }

    /// Human-readable endpoint for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match &self.socket_path {
            Some(path) => format!("unix:{}", path.display()),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}
