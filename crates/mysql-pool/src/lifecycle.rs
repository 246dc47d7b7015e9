//! Session lifecycle bookkeeping.
//!
//! A session is owned by exactly one party at a time: the idle set, the
//! caller holding a checkout, or the factory while it is being created or
//! destroyed. [`SessionState`] records which, and [`SessionHealth`] carries
//! the liveness flag that the transport watcher flips from another task.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session is idle in the pool.
    Idle,
    /// Session is checked out by a caller.
    InUse,
    /// Session is being probed before checkout.
    Validating,
    /// Session is being closed.
    Destroying,
}

impl SessionState {
    /// Check if the session is available for checkout.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the session is held outside the idle set.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::InUse | Self::Validating)
    }
}

/// Metadata about a pooled session.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    /// Pool-local identifier for this session.
    pub id: u64,
    /// When the session was opened.
    pub created_at: Instant,
    /// When the session was last checked out or returned.
    pub last_used_at: Instant,
    /// When the session last passed a liveness probe.
    pub last_checked_at: Option<Instant>,
    /// Number of times the session has been checked out.
    pub checkout_count: u64,
    /// Current state of the session.
    pub state: SessionState,
}

impl SessionMetadata {
    /// Create metadata for a freshly opened session.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            last_checked_at: None,
            checkout_count: 0,
            state: SessionState::Idle,
        }
    }

    /// Time since the session was last used.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_idle_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Mark the session as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
        self.state = SessionState::InUse;
    }

    /// Mark the session as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
        self.state = SessionState::Idle;
    }

    /// Mark the session as having passed a liveness probe.
    pub fn mark_health_check(&mut self) {
        self.last_checked_at = Some(Instant::now());
    }
}

/// Liveness flag shared between a session and its transport watcher.
#[derive(Debug, Default)]
pub struct SessionHealth {
    dead: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl SessionHealth {
    /// A healthy session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session unusable. The first reason wins.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.dead.store(true, Ordering::Release);
    }

    /// Check whether the session may still be used.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.dead.load(Ordering::Acquire)
    }

    /// Why the session was invalidated, if it was.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_availability() {
        assert!(SessionState::Idle.is_available());
        assert!(!SessionState::InUse.is_available());
        assert!(!SessionState::Validating.is_available());
        assert!(!SessionState::Destroying.is_available());
    }

    #[test]
    fn test_session_state_busy() {
        assert!(!SessionState::Idle.is_busy());
        assert!(SessionState::InUse.is_busy());
        assert!(SessionState::Validating.is_busy());
        assert!(!SessionState::Destroying.is_busy());
    }

    #[tokio::test]
    async fn test_metadata_checkout_and_checkin() {
        let mut meta = SessionMetadata::new(7);
        assert_eq!(meta.checkout_count, 0);
        assert_eq!(meta.state, SessionState::Idle);

        meta.mark_checkout();
        assert_eq!(meta.checkout_count, 1);
        assert_eq!(meta.state, SessionState::InUse);

        meta.mark_checkin();
        assert_eq!(meta.state, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_idle_expiry() {
        let meta = SessionMetadata::new(1);
        assert!(!meta.is_idle_expired(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(meta.is_idle_expired(Duration::from_secs(30)));
    }

    #[test]
    fn test_health_first_reason_wins() {
        let health = SessionHealth::new();
        assert!(health.is_usable());
        assert!(health.reason().is_none());

        health.invalidate("socket reset");
        health.invalidate("second failure");
        assert!(!health.is_usable());
        assert_eq!(health.reason().as_deref(), Some("socket reset"));
    }
}
