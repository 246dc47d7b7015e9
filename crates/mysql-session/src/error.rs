//! Client error types.

use thiserror::Error;

/// Errors reported by the underlying database client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Connect handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Server returned an error.
    #[error("server error {code}: {message}")]
    Server {
        /// MySQL error number.
        code: u16,
        /// SQLSTATE, when the server sent one.
        sql_state: Option<String>,
        /// Error message.
        message: String,
    },

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl ClientError {
    /// Create a server error without a SQLSTATE.
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            sql_state: None,
            message: message.into(),
        }
    }

    /// Check if the session can no longer be used after this error.
    ///
    /// Server errors leave the session usable; everything that points at the
    /// transport or the protocol state does not.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Server { .. })
    }

    /// Check if this is a server error with a specific number.
    #[must_use]
    pub fn is_server_error(&self, code: u16) -> bool {
        matches!(self, Self::Server { code: c, .. } if *c == code)
    }

    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed | Self::Io(_) | Self::Timeout
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
