//! Operator-visible error sink.
//!
//! Validation failures, transport errors and failed closes belong to one
//! session and must not fail unrelated queries, so the pool reports them here
//! instead of returning them.

use crate::error::PoolError;

/// Receives pool-internal errors.
pub trait ErrorSink: Send + Sync + 'static {
    /// Report one error.
    fn report(&self, error: &PoolError);
}

impl<F> ErrorSink for F
where
    F: Fn(&PoolError) + Send + Sync + 'static,
{
    fn report(&self, error: &PoolError) {
        self(error)
    }
}

/// Default sink: logs through `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, error: &PoolError) {
        tracing::warn!(error = %error, "database pool error");
    }
}
