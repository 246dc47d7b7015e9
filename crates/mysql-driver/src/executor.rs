//! Cancellable query execution over the session pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use mysql_driver_pool::{ErrorSink, LogSink, Pool, PoolStatus, PooledSession, Session};
use mysql_session::{Connector, QueryResult, Value};

use crate::cancel::{CancelHandle, Killer, QueryScope, spawn_kill};
use crate::config::{DriverConfig, validate_time_zone};
use crate::dialect::MySqlDialect;
use crate::error::{DriverError, Result};

/// A session as seen by the work passed to [`Driver::with_connection`].
pub type DriverSession<C> = Session<<C as Connector>::Connection>;

/// Pooled MySQL driver.
///
/// Cloning is cheap; all clones share one pool.
pub struct Driver<C: Connector> {
    inner: Arc<DriverInner<C>>,
}

impl<C: Connector> Clone for Driver<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct DriverInner<C: Connector> {
    pool: Pool<C>,
    set_time_zone: String,
    killer: Killer,
}

impl<C: Connector> Driver<C> {
    /// Create a driver whose pool reports session errors through `tracing`.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(connector: C, config: DriverConfig) -> Result<Self> {
        Self::with_error_sink(connector, config, Arc::new(LogSink))
    }

    /// Create a driver with a custom sink for pool-internal errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_error_sink(
        connector: C,
        config: DriverConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        let tz = config.effective_timezone().to_string();
        validate_time_zone(&tz)?;

        let pool = Pool::builder(connector, config.connect)
            .config(config.pool)
            .error_sink(sink)
            .build()?;

        let inner = Arc::new_cyclic(|weak: &Weak<DriverInner<C>>| DriverInner {
            pool,
            set_time_zone: MySqlDialect::set_time_zone(&tz),
            killer: kill_through(weak.clone()),
        });
        tracing::debug!(store_timezone = tz.as_str(), "driver created");
        Ok(Self { inner })
    }

    /// Run `work` on a pooled session.
    ///
    /// The session's server id is fetched first and bound to the returned
    /// query's [`CancelHandle`]. The session is released whether `work`
    /// succeeds or fails. If cancellation was requested at any point before
    /// the outcome is delivered, the outcome is [`DriverError::Cancelled`]
    /// regardless of what `work` returned, including an unrelated error.
    ///
    /// Like any future, the returned query does nothing until polled.
    pub fn with_connection<T, F>(&self, work: F) -> CancellableQuery<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s mut DriverSession<C>) -> BoxFuture<'s, Result<T>> + Send + 'static,
    {
        let handle = CancelHandle::new(Arc::clone(&self.inner.killer));
        let scope = QueryScope::new(handle.clone());
        let driver = self.clone();
        CancellableQuery {
            future: Box::pin(async move { driver.run(work, scope).await }),
            handle,
        }
    }

    /// Run a statement after setting the session time zone.
    pub fn query(&self, sql: impl Into<String>, params: Vec<Value>) -> CancellableQuery<QueryResult> {
        let sql = sql.into();
        let set_time_zone = self.inner.set_time_zone.clone();
        self.with_connection(move |session| {
            Box::pin(async move {
                session.execute(&set_time_zone, &[]).await?;
                Ok::<_, DriverError>(session.execute(&sql, &params).await?)
            })
        })
    }

    /// Check connectivity with a session that bypasses the pool.
    ///
    /// Returns the probe's result.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the probe fails.
    pub async fn test_connection(&self) -> Result<QueryResult> {
        let factory = self.inner.pool.factory();
        let mut session = factory.create().await?;
        let outcome = session.execute(factory.probe(), &[]).await;
        factory.destroy(session).await;
        Ok(outcome?)
    }

    /// Statement helpers for building SQL against this driver.
    #[must_use]
    pub fn dialect(&self) -> MySqlDialect {
        MySqlDialect
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<C> {
        &self.inner.pool
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.pool.status()
    }

    /// Close the pool. Queries started afterwards fail.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    async fn run<T, F>(&self, work: F, scope: QueryScope) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut DriverSession<C>) -> BoxFuture<'s, Result<T>>,
    {
        let outcome = match self.inner.pool.get().await {
            Ok(mut session) => {
                let outcome = self.run_on(&mut session, work, scope.handle()).await;
                scope.handle().mark_released();
                session.release().await;
                outcome
            }
            Err(e) => Err(e.into()),
        };

        let server_id = scope.handle().target();
        if scope.finish() {
            tracing::debug!(server_id = ?server_id, "query cancelled");
            return Err(DriverError::Cancelled);
        }
        outcome
    }

    async fn run_on<T, F>(
        &self,
        session: &mut PooledSession<C>,
        work: F,
        token: &CancelHandle,
    ) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut DriverSession<C>) -> BoxFuture<'s, Result<T>>,
    {
        let server_id = fetch_session_id(session).await?;
        session.set_server_id(server_id);
        tracing::trace!(session = session.id(), server_id, "session bound to query");

        if let Some(kill) = token.bind(server_id) {
            spawn_kill(kill);
        }
        work(&mut **session).await
    }

    async fn kill(&self, target: u64, token: CancelHandle) -> Result<()> {
        self.with_connection(move |helper| {
            Box::pin(async move {
                if token.is_released() || helper.server_id() == Some(target) {
                    tracing::debug!(server_id = target, "target already released, not killing");
                    return Ok(());
                }
                helper.execute(&MySqlDialect::kill(target), &[]).await?;
                Ok::<_, DriverError>(())
            })
        })
        .await
    }
}

impl<C: Connector> std::fmt::Debug for Driver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("pool", &self.inner.pool)
            .field("set_time_zone", &self.inner.set_time_zone)
            .finish()
    }
}

fn kill_through<C: Connector>(driver: Weak<DriverInner<C>>) -> Killer {
    Arc::new(move |target, token| {
        let driver = driver.clone();
        Box::pin(async move {
            match driver.upgrade() {
                Some(inner) => Driver { inner }.kill(target, token).await,
                None => Ok(()),
            }
        })
    })
}

async fn fetch_session_id<C: Connector>(session: &mut PooledSession<C>) -> Result<u64> {
    let result = session.execute(MySqlDialect::SESSION_ID_QUERY, &[]).await?;
    result
        .first_row()
        .and_then(|row| row.get(MySqlDialect::SESSION_ID_COLUMN))
        .and_then(Value::as_u64)
        .ok_or(DriverError::MissingSessionId)
}

/// A query in flight, paired with its cancel handle.
///
/// Resolves to the query's outcome. Dropping it before completion
/// abandons the query; spawn it to let it run independently.
#[must_use = "queries do nothing unless polled"]
pub struct CancellableQuery<T> {
    future: BoxFuture<'static, Result<T>>,
    handle: CancelHandle,
}

impl<T> CancellableQuery<T> {
    /// A handle that cancels this query.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Request cancellation. See [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Split into the outcome future and the handle.
    pub fn into_parts(self) -> (BoxFuture<'static, Result<T>>, CancelHandle) {
        (self.future, self.handle)
    }
}

impl<T> Future for CancellableQuery<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for CancellableQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableQuery")
            .field("handle", &self.handle)
            .finish()
    }
}
