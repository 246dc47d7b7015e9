//! Pooled session wrapper.

use std::sync::Arc;

use mysql_session::{ClientError, Connection, QueryResult, Value};

use crate::lifecycle::{SessionHealth, SessionMetadata};

/// An open session plus the bookkeeping the pool keeps for it.
pub struct Session<T> {
    conn: T,
    meta: SessionMetadata,
    health: Arc<SessionHealth>,
    server_id: Option<u64>,
}

impl<T: Connection> Session<T> {
    pub(crate) fn new(id: u64, conn: T, health: Arc<SessionHealth>) -> Self {
        Self {
            conn,
            meta: SessionMetadata::new(id),
            health,
            server_id: None,
        }
    }

    /// Run a statement on this session.
    ///
    /// A fatal client error marks the session unusable so that it is
    /// destroyed on release instead of going back to the idle set.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, ClientError> {
        tracing::trace!(session = self.meta.id, sql = sql, params = params.len(), "executing statement");
        match self.conn.execute(sql, params).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_fatal() {
                    tracing::debug!(session = self.meta.id, error = %e, "fatal statement error, invalidating session");
                    self.health.invalidate(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Pool-local identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Session metadata.
    #[must_use]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.meta
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut SessionMetadata {
        &mut self.meta
    }

    /// Check whether the session may still be used.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.health.is_usable()
    }

    /// Mark the session unusable; it will be destroyed on release.
    pub fn invalidate(&self, reason: impl Into<String>) {
        self.health.invalidate(reason);
    }

    /// Server-assigned session id fetched during the current checkout.
    #[must_use]
    pub fn server_id(&self) -> Option<u64> {
        self.server_id
    }

    /// Record the server-assigned session id for the current checkout.
    pub fn set_server_id(&mut self, id: u64) {
        self.server_id = Some(id);
    }

    pub(crate) fn clear_server_id(&mut self) {
        self.server_id = None;
    }

    /// Direct access to the underlying client.
    pub fn connection_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    pub(crate) fn into_parts(self) -> (T, SessionMetadata, Arc<SessionHealth>) {
        (self.conn, self.meta, self.health)
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.meta.id)
            .field("state", &self.meta.state)
            .field("server_id", &self.server_id)
            .field("usable", &self.health.is_usable())
            .finish()
    }
}
