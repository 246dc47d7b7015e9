//! Session pool integration tests.
//!
//! These run against the in-process mock server from `mysql-testing`, so no
//! database is needed:
//!
//! ```bash
//! cargo test -p mysql-driver-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use mysql_driver_pool::{ErrorSink, Pool, PoolConfig, PoolError};
use mysql_testing::{MockServer, fixtures};
use parking_lot::Mutex;
use proptest::prelude::*;
use tokio_test::{assert_pending, assert_ready_ok};

/// Sink that keeps the rendered errors for assertions.
#[derive(Default)]
struct RecordingSink {
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, error: &PoolError) {
        self.errors.lock().push(error.to_string());
    }
}

fn build_pool(server: &MockServer, config: PoolConfig) -> (Pool<MockServer>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let pool = Pool::builder(server.clone(), fixtures::mock_options())
        .config(config)
        .error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>)
        .build()
        .expect("pool should build");
    (pool, sink)
}

// =============================================================================
// Basic Pool Tests
// =============================================================================

#[tokio::test]
async fn test_pool_create_and_close() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(5));

    assert!(!pool.is_closed());
    let status = pool.status();
    assert_eq!(status.max, 5);
    assert_eq!(status.total, 0);
    assert_eq!(server.open_sessions(), 0, "sessions are created lazily");

    pool.close().await;
    assert!(pool.is_closed());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let server = MockServer::new();
    let result = Pool::new(
        server,
        fixtures::mock_options(),
        PoolConfig::new().max_connections(0),
    );
    assert!(matches!(result, Err(PoolError::Configuration(_))));
}

#[tokio::test]
async fn test_released_session_is_reused() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let mut session = pool.get().await.unwrap();
    let first = session.id();
    session.execute("SELECT 1", &[]).await.unwrap();
    session.release().await;

    let session = pool.get().await.unwrap();
    assert_eq!(session.id(), first);
    assert_eq!(session.metadata().checkout_count, 2);
    assert_eq!(server.connect_count(), 1);

    let status = pool.status();
    assert_eq!(status.in_use, 1);
    assert_eq!(status.available, 0);
}

#[tokio::test]
async fn test_most_recently_released_goes_out_first() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let b_id = b.id();
    a.release().await;
    b.release().await;

    let next = pool.get().await.unwrap();
    assert_eq!(next.id(), b_id);
}

#[tokio::test]
async fn test_dropped_session_is_not_reused() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().test_on_borrow(false));

    let session = pool.get().await.unwrap();
    let dropped = session.id();
    drop(session);

    let status = pool.status();
    assert_eq!(status.available, 0);

    let session = pool.get().await.unwrap();
    assert_ne!(session.id(), dropped);
    assert_eq!(server.connect_count(), 2);

    session.release().await;
    while pool.stats().destroyed == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(server.open_sessions(), 1);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test]
async fn test_server_id_cleared_on_release() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let mut session = pool.get().await.unwrap();
    session.set_server_id(42);
    session.release().await;

    let session = pool.get().await.unwrap();
    assert_eq!(session.server_id(), None);
}

// =============================================================================
// Bound and Timeout Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_acquires_respect_max() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(3));
    let in_use = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            let session = pool.get().await.unwrap();
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(server.open_sessions() <= 3);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            session.release().await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(server.connect_count() <= 3);
    assert_eq!(pool.stats().acquired, 10);
}

#[tokio::test]
async fn test_single_session_pool_blocks_until_release() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(1));

    let held = pool.get().await.unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "second acquire must wait");

    held.release().await;
    let got = waiter.await.unwrap().unwrap();
    assert_eq!(got, held_id);
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_release_wakes_waiting_acquire() {
    let server = MockServer::new();
    let (pool, _) = build_pool(
        &server,
        PoolConfig::new().max_connections(1).test_on_borrow(false),
    );

    let held = pool.get().await.unwrap();
    let held_id = held.id();
    let mut waiter = tokio_test::task::spawn(pool.get());
    assert_pending!(waiter.poll());

    held.release().await;
    assert!(waiter.is_woken());
    let session = assert_ready_ok!(waiter.poll());
    assert_eq!(session.id(), held_id);
    assert_eq!(session.metadata().checkout_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_timeout_reports_exhausted() {
    let server = MockServer::new();
    let (pool, sink) = build_pool(
        &server,
        PoolConfig::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200)),
    );

    let _held = pool.get().await.unwrap();
    let err = pool.get().await.unwrap_err();

    assert!(matches!(err, PoolError::Exhausted(t) if t == Duration::from_millis(200)));
    assert!(err.is_transient());
    assert_eq!(pool.stats().exhausted, 1);
    assert!(sink.errors().is_empty(), "exhaustion is returned, not reported");
}

#[tokio::test]
async fn test_connect_failure_frees_slot() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(1));

    server.set_fail_connect(true);
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::Connection(_)));
    assert_eq!(pool.status().total, 0);

    server.set_fail_connect(false);
    let session = pool.get().await.unwrap();
    assert!(session.is_usable());
}

// =============================================================================
// Validation and Transport Error Tests
// =============================================================================

#[tokio::test]
async fn test_failed_probe_discards_session() {
    let server = MockServer::new();
    let (pool, sink) = build_pool(&server, PoolConfig::new());

    let session = pool.get().await.unwrap();
    let stale = session.id();
    session.release().await;

    server.set_fail_probes(true);
    let session = pool.get().await.unwrap();

    assert_ne!(session.id(), stale, "a fresh session replaces the stale one");
    assert_eq!(server.open_sessions(), 1);
    assert_eq!(pool.stats().validation_failures, 1);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("validation"), "unexpected sink entry: {}", errors[0]);
}

#[tokio::test]
async fn test_probe_skipped_when_test_on_borrow_disabled() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().test_on_borrow(false));

    pool.get().await.unwrap().release().await;
    pool.get().await.unwrap().release().await;

    let probes = server.executed_matching("SELECT 1");
    assert!(probes.is_empty());
}

#[tokio::test]
async fn test_probe_runs_on_every_reuse() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    pool.get().await.unwrap().release().await;
    pool.get().await.unwrap().release().await;
    pool.get().await.unwrap().release().await;

    // The fresh session is not probed, the two reuses are.
    assert_eq!(server.executed_matching("SELECT 1").len(), 2);
}

#[tokio::test]
async fn test_transport_error_destroys_session_on_release() {
    let server = MockServer::new();
    let (pool, sink) = build_pool(&server, PoolConfig::new().test_on_borrow(false));

    let session = pool.get().await.unwrap();
    let thread_id = server.session_ids()[0];
    assert!(server.break_session(thread_id));

    while session.is_usable() {
        tokio::task::yield_now().await;
    }
    session.release().await;

    assert_eq!(pool.status().total, 0);
    assert_eq!(server.open_sessions(), 0);
    assert!(sink.errors().iter().any(|e| e.contains("transport")));

    let fresh = pool.get().await.unwrap();
    assert!(fresh.is_usable());
    assert_eq!(server.connect_count(), 2);
}

#[tokio::test]
async fn test_fatal_statement_error_invalidates_session() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let mut session = pool.get().await.unwrap();
    let thread_id = server.session_ids()[0];
    server.break_session(thread_id);

    assert!(session.execute("SELECT 2", &[]).await.is_err());
    assert!(!session.is_usable());
    session.release().await;
    assert_eq!(pool.status().available, 0);
}

#[tokio::test]
async fn test_server_error_keeps_session() {
    let server = MockServer::builder()
        .with_response("SELECT * FROM missing", mysql_testing::MockResponse::error(1146, "Table doesn't exist"))
        .build();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let mut session = pool.get().await.unwrap();
    let err = session.execute("SELECT * FROM missing", &[]).await.unwrap_err();
    assert!(err.is_server_error(1146));
    assert!(session.is_usable());
    session.release().await;
    assert_eq!(pool.status().available, 1);
}

// =============================================================================
// Eviction and Minimum Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_session_evicted_after_timeout() {
    let server = MockServer::new();
    let (pool, _) = build_pool(
        &server,
        PoolConfig::new()
            .idle_timeout(Duration::from_secs(30))
            .soft_idle_timeout(Duration::from_secs(30))
            .eviction_interval(Duration::from_secs(10)),
    );

    pool.get().await.unwrap().release().await;
    assert_eq!(server.open_sessions(), 1);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(server.open_sessions(), 1, "not idle long enough yet");

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(server.open_sessions(), 0);
    assert_eq!(pool.stats().evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_minimum_sessions_created_on_build() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().min_connections(2));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(server.open_sessions(), 2);
    assert_eq!(pool.status().available, 2);
}

#[tokio::test(start_paused = true)]
async fn test_soft_eviction_keeps_minimum() {
    let server = MockServer::new();
    let (pool, _) = build_pool(
        &server,
        PoolConfig::new()
            .min_connections(1)
            .soft_idle_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .eviction_interval(Duration::from_secs(10)),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    a.release().await;
    b.release().await;
    assert_eq!(server.open_sessions(), 2);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(server.open_sessions(), 1);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dead_idle_session_swept() {
    let server = MockServer::new();
    let (pool, _) = build_pool(
        &server,
        PoolConfig::new().eviction_interval(Duration::from_secs(10)),
    );

    pool.get().await.unwrap().release().await;
    let thread_id = server.session_ids()[0];
    server.break_session(thread_id);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(pool.status().total, 0);
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_close_rejects_waiters_and_new_acquires() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(1));

    let held = pool.get().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get().await.map(|s| s.id()) })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.close().await;
    assert!(matches!(waiter.await.unwrap(), Err(PoolError::PoolClosed)));
    assert!(matches!(pool.get().await, Err(PoolError::PoolClosed)));

    held.release().await;
    assert_eq!(server.open_sessions(), 0);
}

#[tokio::test]
async fn test_close_destroys_idle_sessions() {
    let server = MockServer::new();
    let (pool, _) = build_pool(&server, PoolConfig::new());

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    a.release().await;
    b.release().await;
    assert_eq!(server.open_sessions(), 2);

    pool.close().await;
    assert_eq!(server.open_sessions(), 0);
    assert_eq!(pool.stats().destroyed, 2);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_live_sessions_never_exceed_max(max in 1u32..5, workers in 1usize..16) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let peak = runtime.block_on(async move {
            let server = MockServer::new();
            let (pool, _) = build_pool(&server, PoolConfig::new().max_connections(max));
            let peak = Arc::new(AtomicU32::new(0));

            let mut handles = Vec::new();
            for i in 0..workers {
                let pool = pool.clone();
                let server = server.clone();
                let peak = Arc::clone(&peak);
                handles.push(tokio::spawn(async move {
                    let session = pool.get().await.unwrap();
                    peak.fetch_max(server.open_sessions() as u32, Ordering::SeqCst);
                    if i % 2 == 0 {
                        tokio::task::yield_now().await;
                    }
                    session.release().await;
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            peak.load(Ordering::SeqCst)
        });

        prop_assert!(peak <= max);
    }
}
