//! Query cancellation support.
//!
//! MySQL cannot interrupt a statement from the session running it. A
//! [`CancelHandle`] therefore borrows a second session from the same pool
//! and sends `KILL <connection_id>` for the session the query runs on; the
//! server then aborts the statement and closes that session.
//!
//! ## Example
//!
//! ```rust,ignore
//! let query = driver.query("SELECT SLEEP(600)", vec![]);
//! let cancel = query.cancel_handle();
//!
//! tokio::spawn(async move {
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     cancel.cancel();
//! });
//!
//! // Err(DriverError::Cancelled) if the cancel landed first
//! let result = query.await;
//! ```
//!
//! ## Important Notes
//!
//! - The handle is cloneable and can be shared across tasks
//! - Calling `cancel()` is idempotent; at most one `KILL` is sent
//! - A cancel requested before the session id is known is sent as soon as
//!   it is
//! - Once the query's outcome has been delivered the handle is inert
//! - Any cancel requested before that turns the outcome into
//!   [`DriverError::Cancelled`](crate::DriverError::Cancelled), whatever the statement returned

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use futures_util::future::BoxFuture;

use crate::error::Result;

/// Sends the kill for a target session id.
pub(crate) type Killer =
    Arc<dyn Fn(u64, CancelHandle) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handle for cancelling one query.
///
/// # Thread Safety
///
/// The `CancelHandle` is `Send + Sync` and can be safely shared between tasks.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
    killer: Killer,
}

const REQUESTED: u8 = 1;
const RELEASED: u8 = 1 << 1;
const SETTLED: u8 = 1 << 2;

#[derive(Default)]
struct CancelState {
    // REQUESTED | RELEASED | SETTLED; one word so a request and the
    // settle agree on which came first.
    phase: AtomicU8,
    // 0 until bound; MySQL connection ids start at 1.
    target: AtomicU64,
    kill_issued: AtomicBool,
}

impl CancelHandle {
    pub(crate) fn new(killer: Killer) -> Self {
        Self {
            state: Arc::new(CancelState::default()),
            killer,
        }
    }

    /// Request cancellation.
    ///
    /// Sends the kill on a spawned task and returns immediately. Use
    /// [`cancel_and_wait`](Self::cancel_and_wait) to observe the kill's own
    /// outcome.
    pub fn cancel(&self) {
        if let Some(kill) = self.request() {
            spawn_kill(kill);
        }
    }

    /// Request cancellation and wait for the kill to be sent.
    ///
    /// Returns `Ok(())` without waiting when nothing needs sending: the
    /// handle is inert, a kill was already sent, or the session id is not
    /// known yet (the executor sends it once it is).
    ///
    /// # Errors
    ///
    /// Returns the error of the kill itself, for example
    /// [`PoolError::Exhausted`](mysql_driver_pool::PoolError::Exhausted) when
    /// no helper session could be acquired. The query still reports
    /// [`DriverError::Cancelled`](crate::DriverError::Cancelled) either way.
    pub async fn cancel_and_wait(&self) -> Result<()> {
        match self.request() {
            Some(kill) => kill.await,
            None => Ok(()),
        }
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.phase() & REQUESTED != 0
    }

    /// Server session id of the query, once known.
    #[must_use]
    pub fn target(&self) -> Option<u64> {
        match self.state.target.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Check if the query's session has been handed back to the pool.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.phase() & RELEASED != 0
    }

    /// Check if the query's outcome has been delivered.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase() & SETTLED != 0
    }

    fn phase(&self) -> u8 {
        self.state.phase.load(Ordering::SeqCst)
    }

    fn request(&self) -> Option<BoxFuture<'static, Result<()>>> {
        let recorded = self
            .state
            .phase
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |phase| {
                (phase & SETTLED == 0).then_some(phase | REQUESTED)
            });
        if recorded.is_err() {
            tracing::trace!("cancel after completion ignored");
            return None;
        }

        let target = self.target()?;
        self.take_kill(target)
    }

    /// Record the query's session id. Returns the kill to send when
    /// cancellation was requested before the id was known.
    pub(crate) fn bind(&self, target: u64) -> Option<BoxFuture<'static, Result<()>>> {
        self.state.target.store(target, Ordering::SeqCst);
        if self.is_cancelled() {
            self.take_kill(target)
        } else {
            None
        }
    }

    pub(crate) fn mark_released(&self) {
        self.state.phase.fetch_or(RELEASED, Ordering::SeqCst);
    }

    /// Make the handle inert. Returns whether cancellation was requested.
    pub(crate) fn settle(&self) -> bool {
        let before = self
            .state
            .phase
            .fetch_or(RELEASED | SETTLED, Ordering::SeqCst);
        before & REQUESTED != 0
    }

    fn take_kill(&self, target: u64) -> Option<BoxFuture<'static, Result<()>>> {
        if self.state.kill_issued.swap(true, Ordering::SeqCst) {
            return None;
        }
        tracing::debug!(server_id = target, "issuing kill for cancelled query");
        Some((self.killer)(target, self.clone()))
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("requested", &self.is_cancelled())
            .field("target", &self.target())
            .field("released", &self.is_released())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// One run of a query, tied to its handle.
///
/// Dropping the scope without [`finish`](Self::finish), as happens when the
/// query future is abandoned, still releases and settles the handle, so a
/// later cancel cannot reach whoever borrows the session next.
pub(crate) struct QueryScope {
    handle: CancelHandle,
    finished: bool,
}

impl QueryScope {
    pub(crate) fn new(handle: CancelHandle) -> Self {
        Self {
            handle,
            finished: false,
        }
    }

    pub(crate) fn handle(&self) -> &CancelHandle {
        &self.handle
    }

    /// Settle the handle. Returns whether cancellation was requested.
    pub(crate) fn finish(mut self) -> bool {
        self.finished = true;
        self.handle.settle()
    }
}

impl Drop for QueryScope {
    fn drop(&mut self) {
        if !self.finished {
            let cancelled = self.handle.settle();
            tracing::debug!(server_id = ?self.handle.target(), cancelled, "query abandoned");
        }
    }
}

pub(crate) fn spawn_kill(kill: BoxFuture<'static, Result<()>>) {
    let task = async move {
        if let Err(e) = kill.await {
            tracing::warn!(error = %e, "failed to kill cancelled query");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => tracing::warn!("no runtime to send kill; cancellation only marks the query"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (CancelHandle, Arc<Mutex<Vec<u64>>>) {
        let kills = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&kills);
        let killer: Killer = Arc::new(move |target, _| {
            seen.lock().unwrap().push(target);
            Box::pin(async { Ok(()) })
        });
        (CancelHandle::new(killer), kills)
    }

    #[tokio::test]
    async fn test_cancel_after_bind_kills_once() {
        let (handle, kills) = recording();
        assert!(handle.bind(7).is_none());

        handle.cancel_and_wait().await.unwrap();
        handle.cancel_and_wait().await.unwrap();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(*kills.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_cancel_before_bind_is_deferred() {
        let (handle, kills) = recording();
        handle.cancel_and_wait().await.unwrap();
        assert!(kills.lock().unwrap().is_empty());

        let kill = handle.bind(3).unwrap();
        kill.await.unwrap();
        assert_eq!(*kills.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_settled_handle_is_inert() {
        let (handle, kills) = recording();
        handle.bind(5);
        assert!(!handle.settle());

        handle.cancel_and_wait().await.unwrap();
        assert!(!handle.is_cancelled());
        assert!(kills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_scope_settles_handle() {
        let (handle, kills) = recording();
        let scope = QueryScope::new(handle.clone());
        assert!(scope.handle().bind(9).is_none());
        drop(scope);

        assert!(handle.is_released());
        assert!(handle.is_settled());
        handle.cancel_and_wait().await.unwrap();
        assert!(!handle.is_cancelled());
        assert!(kills.lock().unwrap().is_empty());
    }

    #[test]
    fn test_finished_scope_reports_request() {
        let (handle, _) = recording();
        let scope = QueryScope::new(handle.clone());
        handle.cancel();
        assert!(scope.finish());
        assert!(handle.is_settled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_request_and_settle_agree() {
        for _ in 0..200 {
            let (handle, _) = recording();
            let racer = handle.clone();
            let cancel = std::thread::spawn(move || racer.cancel());
            let cancelled = handle.settle();
            cancel.join().unwrap();
            assert_eq!(cancelled, handle.is_cancelled());
        }
    }

    #[test]
    fn test_settle_reports_request() {
        let (handle, _) = recording();
        handle.cancel();
        assert!(handle.settle());
        assert_eq!(handle.target(), None);
    }
}
