//! Session factory: create, validate and destroy raw sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mysql_session::{ConnectOptions, Connection, Connector};

use crate::config::DEFAULT_HEALTH_CHECK_QUERY;
use crate::error::PoolError;
use crate::lifecycle::{SessionHealth, SessionState};
use crate::session::Session;
use crate::sink::{ErrorSink, LogSink};

/// Creates sessions against the configured endpoint.
///
/// The factory is usable on its own (the executor's connectivity check goes
/// through it directly) and is what the pool calls for every create, probe
/// and destroy.
pub struct ConnectionFactory<C: Connector> {
    connector: C,
    options: Arc<ConnectOptions>,
    probe: Arc<str>,
    sink: Arc<dyn ErrorSink>,
    next_id: AtomicU64,
}

impl<C: Connector> ConnectionFactory<C> {
    /// Create a factory that reports errors through [`LogSink`].
    pub fn new(connector: C, options: ConnectOptions) -> Self {
        Self {
            connector,
            options: Arc::new(options),
            probe: Arc::from(DEFAULT_HEALTH_CHECK_QUERY),
            sink: Arc::new(LogSink),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set the liveness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<str>) -> Self {
        self.probe = probe;
        self
    }

    /// Set the error sink.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Connect options used for every session.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Liveness probe statement.
    #[must_use]
    pub fn probe(&self) -> &str {
        &self.probe
    }

    pub(crate) fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    /// Open a new session.
    ///
    /// If the client exposes an error channel, a watcher task marks the
    /// session unusable on the first asynchronous transport error so that it
    /// is destroyed rather than reused.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Connection`] if the connect handshake fails.
    pub async fn create(&self) -> Result<Session<C::Connection>, PoolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, endpoint = %self.options.endpoint(), "opening session");

        let mut conn = self.connector.connect(&self.options).await.map_err(|e| {
            tracing::debug!(session = id, error = %e, "connect handshake failed");
            PoolError::Connection(e)
        })?;

        let health = Arc::new(SessionHealth::new());
        if let Some(mut events) = conn.take_error_events() {
            let health = Arc::clone(&health);
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                // Only the first error matters: the session is dead afterwards.
                if let Some(err) = events.recv().await {
                    tracing::warn!(session = id, error = %err, "transport error, invalidating session");
                    health.invalidate(err.to_string());
                    sink.report(&PoolError::Transport {
                        session: id,
                        source: err,
                    });
                }
            });
        }

        tracing::debug!(session = id, "session opened");
        Ok(Session::new(id, conn, health))
    }

    /// Probe a session.
    ///
    /// Returns `false` if the session was already invalidated or the probe
    /// fails; probe failures are reported to the error sink, never returned.
    pub async fn validate(&self, session: &mut Session<C::Connection>) -> bool {
        if !session.is_usable() {
            return false;
        }

        let previous = session.metadata().state;
        session.metadata_mut().state = SessionState::Validating;
        let outcome = session.execute(&self.probe, &[]).await;
        session.metadata_mut().state = previous;

        match outcome {
            Ok(_) => {
                session.metadata_mut().mark_health_check();
                true
            }
            Err(e) => {
                session.invalidate(e.to_string());
                self.sink.report(&PoolError::ValidationFailed {
                    session: session.id(),
                    source: e,
                });
                false
            }
        }
    }

    /// Close a session. Never fails.
    ///
    /// Closing a session that is already known to be dead is expected to
    /// error and is only logged; otherwise the failure goes to the sink.
    pub async fn destroy(&self, session: Session<C::Connection>) {
        let (mut conn, mut meta, health) = session.into_parts();
        meta.state = SessionState::Destroying;
        tracing::debug!(session = meta.id, checkouts = meta.checkout_count, "closing session");

        if let Err(e) = conn.end().await {
            if health.is_usable() {
                self.sink.report(&PoolError::DestroyFailed {
                    session: meta.id,
                    source: e,
                });
            } else {
                tracing::debug!(session = meta.id, error = %e, "close of dead session failed");
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("endpoint", &self.options.endpoint())
            .field("probe", &self.probe)
            .finish()
    }
}
