//! Error types for the driver.

use mysql_driver_pool::PoolError;
use mysql_session::ClientError;
use thiserror::Error;

/// Errors that can occur while running a query through the driver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// Acquiring a session failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The statement or the session failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Cancellation was requested before the outcome was delivered.
    ///
    /// Supersedes whatever result or error the query produced.
    #[error("Query cancelled")]
    Cancelled,

    /// Invalid driver configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Store time zone cannot be used in `SET time_zone`.
    #[error("invalid time zone: {0}")]
    InvalidTimeZone(String),

    /// The server did not return a session id.
    #[error("server did not report a session id")]
    MissingSessionId,
}

impl DriverError {
    /// Check if this error reports a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the query may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Pool(e) => e.is_transient(),
            Self::Client(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
