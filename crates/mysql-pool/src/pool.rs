//! Session pool implementation.
//!
//! Every live session (idle, checked out, being probed, created or closed)
//! holds one permit of a semaphore sized to `max_connections`, so the bound
//! on live sessions cannot be exceeded no matter how acquires interleave.
//! Idle sessions sit in a LIFO stack together with their permit; the sweep
//! evicts from the cold end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mysql_session::{ConnectOptions, Connector};
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::ConnectionFactory;
use crate::session::Session;
use crate::sink::{ErrorSink, LogSink};

/// A bounded pool of MySQL sessions.
///
/// Cloning is cheap; all clones share the same sessions. There is no global
/// pool: each driver instance builds its own.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<C: Connector> {
    config: PoolConfig,
    factory: ConnectionFactory<C>,
    idle: Mutex<VecDeque<IdleSession<C::Connection>>>,
    slots: Arc<Semaphore>,
    returned: Notify,
    closed: AtomicBool,
    counters: Counters,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

struct IdleSession<T> {
    session: Session<T>,
    slot: OwnedSemaphorePermit,
}

/// Builder for [`Pool`].
pub struct PoolBuilder<C: Connector> {
    connector: C,
    options: ConnectOptions,
    config: PoolConfig,
    sink: Arc<dyn ErrorSink>,
}

impl<C: Connector> PoolBuilder<C> {
    /// Replace the whole pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of live sessions.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the minimum number of sessions kept open.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Set the sink for pool-internal errors.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the pool and start its maintenance task.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Configuration`] if the configuration is invalid
    /// or if called outside a Tokio runtime.
    pub fn build(self) -> Result<Pool<C>, PoolError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PoolError::Configuration("pool must be built inside a Tokio runtime".into())
        })?;

        let factory = ConnectionFactory::new(self.connector, self.options)
            .with_probe(Arc::clone(&self.config.health_check_query))
            .with_error_sink(self.sink);

        let max = self.config.max_connections as usize;
        let inner = Arc::new(PoolInner {
            factory,
            idle: Mutex::new(VecDeque::with_capacity(max)),
            slots: Arc::new(Semaphore::new(max)),
            returned: Notify::new(),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            maintenance: Mutex::new(None),
            config: self.config,
        });

        if inner.config.eviction_enabled() || inner.config.min_connections > 0 {
            let handle = runtime.spawn(run_maintenance(Arc::downgrade(&inner)));
            *inner.maintenance.lock() = Some(handle);
        }

        tracing::debug!(
            max = inner.config.max_connections,
            min = inner.config.min_connections,
            endpoint = %inner.factory.options().endpoint(),
            "session pool created"
        );
        Ok(Pool { inner })
    }
}

impl<C: Connector> Pool<C> {
    /// Start building a pool for `connector` with default configuration.
    pub fn builder(connector: C, options: ConnectOptions) -> PoolBuilder<C> {
        PoolBuilder {
            connector,
            options,
            config: PoolConfig::default(),
            sink: Arc::new(LogSink),
        }
    }

    /// Build a pool with the given configuration and the default error sink.
    ///
    /// # Errors
    ///
    /// See [`PoolBuilder::build`].
    pub fn new(connector: C, options: ConnectOptions, config: PoolConfig) -> Result<Self, PoolError> {
        Self::builder(connector, options).config(config).build()
    }

    /// Get a session from the pool.
    ///
    /// Hands out the most recently returned idle session after probing it
    /// (when `test_on_borrow` is set); sessions that fail the probe are
    /// destroyed and the next candidate is tried. With no idle session a new
    /// one is created if the pool is below `max_connections`, otherwise this
    /// waits for a release.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Exhausted`] if nothing became available within
    ///   `acquire_timeout`
    /// - [`PoolError::Connection`] if creating a session failed
    /// - [`PoolError::PoolClosed`] if the pool is closed
    pub async fn get(&self) -> Result<PooledSession<C>, PoolError> {
        let timeout = self.inner.config.acquire_timeout;
        let started = Instant::now();
        tracing::trace!("acquiring session from pool");

        match tokio::time::timeout(timeout, self.inner.acquire()).await {
            Ok(Ok(pooled)) => {
                self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    session = pooled.id(),
                    wait_ms = started.elapsed().as_millis() as u64,
                    "session acquired"
                );
                Ok(pooled)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.inner.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(timeout = ?timeout, "session acquire timed out");
                Err(PoolError::Exhausted(timeout))
            }
        }
    }

    /// Return a session to the pool.
    ///
    /// Equivalent to [`PooledSession::release`].
    pub async fn release(&self, session: PooledSession<C>) {
        session.release().await;
    }

    /// The factory the pool creates sessions with.
    ///
    /// Sessions created directly through it are not tracked by the pool.
    #[must_use]
    pub fn factory(&self) -> &ConnectionFactory<C> {
        &self.inner.factory
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self.inner.idle.lock().len() as u32;
        let total = self.inner.live() as u32;
        PoolStatus {
            available,
            in_use: total.saturating_sub(available),
            total,
            max: self.inner.config.max_connections,
        }
    }

    /// Get lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.counters.snapshot()
    }

    /// Close the pool.
    ///
    /// Pending and future acquires fail with [`PoolError::PoolClosed`], idle
    /// sessions are destroyed now, checked-out sessions when released.
    pub async fn close(&self) {
        let drained: Vec<_> = {
            let mut idle = self.inner.idle.lock();
            self.inner.closed.store(true, Ordering::Release);
            idle.drain(..).collect()
        };
        self.inner.slots.close();
        self.inner.returned.notify_waiters();
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }

        for IdleSession { session, slot } in drained {
            self.inner.destroy(session, slot).await;
        }
        tracing::info!("session pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Connector> PoolInner<C> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn live(&self) -> usize {
        (self.config.max_connections as usize).saturating_sub(self.slots.available_permits())
    }

    async fn acquire(self: &Arc<Self>) -> Result<PooledSession<C>, PoolError> {
        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            // Register interest before looking at the idle set so a release
            // landing between the check and the wait still wakes us.
            let returned = self.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            if let Some(IdleSession { mut session, slot }) = self.pop_idle() {
                if self.ready_for_checkout(&mut session).await {
                    return Ok(self.checkout(session, slot));
                }
                tracing::debug!(session = session.id(), "discarding session that failed validation");
                self.destroy(session, slot).await;
                continue;
            }

            tokio::select! {
                permit = Arc::clone(&self.slots).acquire_owned() => {
                    let slot = permit.map_err(|_| PoolError::PoolClosed)?;
                    let session = self.factory.create().await?;
                    self.counters.created.fetch_add(1, Ordering::Relaxed);
                    return Ok(self.checkout(session, slot));
                }
                () = &mut returned => {}
            }
        }
    }

    fn pop_idle(&self) -> Option<IdleSession<C::Connection>> {
        self.idle.lock().pop_back()
    }

    async fn ready_for_checkout(&self, session: &mut Session<C::Connection>) -> bool {
        if self.config.test_on_borrow {
            let ok = self.factory.validate(session).await;
            if !ok {
                self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
            }
            ok
        } else {
            session.is_usable()
        }
    }

    fn checkout(
        self: &Arc<Self>,
        mut session: Session<C::Connection>,
        slot: OwnedSemaphorePermit,
    ) -> PooledSession<C> {
        session.metadata_mut().mark_checkout();
        PooledSession {
            session: Some(session),
            slot: Some(slot),
            pool: Arc::clone(self),
        }
    }

    /// Put a session back into the idle set.
    ///
    /// Hands the session back when it has to be destroyed instead: it was
    /// invalidated during use, or the pool closed.
    fn check_in(
        &self,
        mut session: Session<C::Connection>,
        slot: OwnedSemaphorePermit,
    ) -> Option<(Session<C::Connection>, OwnedSemaphorePermit)> {
        if !session.is_usable() {
            return Some((session, slot));
        }

        session.clear_server_id();
        session.metadata_mut().mark_checkin();
        {
            let mut idle = self.idle.lock();
            // Checked under the idle lock: close() flips the flag while holding it.
            if self.is_closed() {
                return Some((session, slot));
            }
            idle.push_back(IdleSession { session, slot });
        }
        self.returned.notify_one();
        None
    }

    async fn destroy(&self, session: Session<C::Connection>, slot: OwnedSemaphorePermit) {
        self.factory.destroy(session).await;
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        drop(slot);
    }

    async fn evict_idle(&self) {
        let evicted = {
            let mut idle = self.idle.lock();
            let mut remaining = idle.len();
            let mut keep = VecDeque::with_capacity(remaining);
            let mut evicted = Vec::new();

            // Front of the queue has been idle longest.
            while let Some(entry) = idle.pop_front() {
                let idle_for = entry.session.metadata().idle_for();
                let hard = idle_for > self.config.idle_timeout;
                let soft = idle_for > self.config.soft_idle_timeout
                    && remaining > self.config.min_connections as usize;

                if hard || soft || !entry.session.is_usable() {
                    remaining -= 1;
                    evicted.push(entry);
                } else {
                    keep.push_back(entry);
                }
            }
            *idle = keep;
            evicted
        };

        for IdleSession { session, slot } in evicted {
            tracing::debug!(
                session = session.id(),
                idle_ms = session.metadata().idle_for().as_millis() as u64,
                "evicting idle session"
            );
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            self.destroy(session, slot).await;
        }
    }

    async fn ensure_minimum(&self) {
        let min = self.config.min_connections as usize;
        while !self.is_closed() && self.live() < min {
            let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };
            match self.factory.create().await {
                Ok(session) => {
                    self.counters.created.fetch_add(1, Ordering::Relaxed);
                    if let Some((session, slot)) = self.check_in(session, slot) {
                        self.destroy(session, slot).await;
                    }
                }
                Err(e) => {
                    self.factory.sink().report(&e);
                    break;
                }
            }
        }
    }
}

async fn run_maintenance<C: Connector>(pool: Weak<PoolInner<C>>) {
    let interval = match pool.upgrade() {
        Some(inner) => {
            inner.ensure_minimum().await;
            inner.config.eviction_interval
        }
        None => return,
    };
    if interval.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = pool.upgrade() else {
            break;
        };
        if inner.is_closed() {
            break;
        }
        inner.evict_idle().await;
        inner.ensure_minimum().await;
    }
    tracing::trace!("pool maintenance stopped");
}

/// A session checked out of the pool.
///
/// Return it with [`PooledSession::release`]. A session dropped without
/// `release` may have a statement abandoned mid-flight, so it is never
/// reused: it is closed on a spawned task and its slot freed afterwards.
pub struct PooledSession<C: Connector> {
    session: Option<Session<C::Connection>>,
    slot: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledSession<C> {
    /// Return the session to the pool, destroying it if it became unusable.
    pub async fn release(mut self) {
        if let (Some(session), Some(slot)) = (self.session.take(), self.slot.take()) {
            tracing::trace!(session = session.id(), "returning session to pool");
            if let Some((session, slot)) = self.pool.check_in(session, slot) {
                self.pool.destroy(session, slot).await;
            }
        }
    }
}

impl<C: Connector> std::ops::Deref for PooledSession<C> {
    type Target = Session<C::Connection>;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only `release` and `drop` take the session, and both consume self.
        self.session
            .as_ref()
            .expect("BUG: PooledSession used after release")
    }
}

impl<C: Connector> std::ops::DerefMut for PooledSession<C> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_mut()
            .expect("BUG: PooledSession used after release")
    }
}

impl<C: Connector> Drop for PooledSession<C> {
    fn drop(&mut self) {
        let (Some(session), Some(slot)) = (self.session.take(), self.slot.take()) else {
            return;
        };
        session.invalidate("dropped without release");
        let Some((session, slot)) = self.pool.check_in(session, slot) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move {
                    pool.destroy(session, slot).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    session = session.id(),
                    "no runtime to close dropped session; closing by drop"
                );
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for PooledSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle sessions available.
    pub available: u32,
    /// Number of sessions checked out, being probed, created or closed.
    pub in_use: u32,
    /// Total number of live sessions.
    pub total: u32,
    /// Maximum allowed sessions.
    pub max: u32,
}

/// Lifetime counters of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions created by the pool.
    pub created: u64,
    /// Sessions destroyed by the pool.
    pub destroyed: u64,
    /// Successful acquires.
    pub acquired: u64,
    /// Acquires that hit the timeout.
    pub exhausted: u64,
    /// Idle sessions that failed the borrow-time probe.
    pub validation_failures: u64,
    /// Idle sessions removed by the sweep.
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    acquired: AtomicU64,
    exhausted: AtomicU64,
    validation_failures: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}
