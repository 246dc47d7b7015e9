//! Pool error types.

use std::time::Duration;

use mysql_session::ClientError;
use thiserror::Error;

/// Errors that can occur during pool operations.
///
/// `Connection` and `Exhausted` reach the caller of [`crate::Pool::get`].
/// `ValidationFailed`, `Transport` and `DestroyFailed` are per-session
/// failures; they are only ever handed to the pool's [`crate::ErrorSink`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// No session became available within the acquire timeout.
    #[error("connection pool exhausted: no session available within {0:?}")]
    Exhausted(Duration),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Session creation failed.
    #[error("failed to create session: {0}")]
    Connection(#[source] ClientError),

    /// Session failed its liveness probe.
    #[error("session {session} failed validation: {source}")]
    ValidationFailed {
        /// Pool-local session id.
        session: u64,
        /// Probe error.
        #[source]
        source: ClientError,
    },

    /// Transport reported an asynchronous error for an open session.
    #[error("session {session} transport error: {source}")]
    Transport {
        /// Pool-local session id.
        session: u64,
        /// Reported error.
        #[source]
        source: ClientError,
    },

    /// Closing a session failed.
    #[error("failed to close session {session}: {source}")]
    DestroyFailed {
        /// Pool-local session id.
        session: u64,
        /// Close error.
        #[source]
        source: ClientError,
    },

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if retrying the acquire may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Exhausted(_) => true,
            Self::Connection(e) => e.is_transient(),
            _ => false,
        }
    }
}
