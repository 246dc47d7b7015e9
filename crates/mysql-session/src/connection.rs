//! Connector and connection traits.
//!
//! These use `#[async_trait]` so that the futures they return are `Send`
//! and can be driven from spawned pool tasks.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{ClientError, Result};
use crate::options::ConnectOptions;
use crate::value::{QueryResult, Value};

/// Stream of asynchronous transport errors raised outside any statement
/// (socket reset, server-side kill, idle disconnect).
pub type TransportErrors = UnboundedReceiver<ClientError>;

/// Opens sessions against a MySQL endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Connection: Connection;

    /// Perform the connect handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] (or an IO error) if the endpoint
    /// cannot be reached or rejects the handshake.
    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection>;
}

/// One open, stateful session.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Run a statement with positional parameters.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the session.
    ///
    /// Called at most once. Implementations should tolerate a transport that
    /// is already half-closed and report it as an error rather than panic.
    async fn end(&mut self) -> Result<()>;

    /// Take the error-notification channel.
    ///
    /// Returns `None` for clients that do not report asynchronous errors, and
    /// on every call after the first.
    fn take_error_events(&mut self) -> Option<TransportErrors>;
}
