//! In-process mock MySQL server for unit testing.
//!
//! [`MockServer`] implements [`Connector`], so a pool or driver can be built
//! on top of it without a real database instance. Every session gets a
//! server thread id (starting at 1), every statement is recorded together
//! with the thread id it ran on, and `KILL <id>` terminates the target
//! session the way the real server does.
//!
//! ## Built-in statements
//!
//! - `SELECT CONNECTION_ID() ...` returns the session's thread id
//! - `SELECT 1` succeeds, unless probes are set to fail
//! - `KILL <id>` ends the target session; unknown ids fail with error 1094
//! - `SET time_zone = ...` succeeds
//!
//! Anything else is answered from the configured responses.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_testing::{MockResponse, MockServer};
//!
//! let server = MockServer::builder()
//!     .with_response("SELECT name FROM users", MockResponse::scalar("name", "Alice"))
//!     .with_response("SELECT SLEEP(60)", MockResponse::Hang)
//!     .build();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mysql_session::{
    ClientError, ConnectOptions, Connection, Connector, QueryResult, TransportErrors, Value,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

/// MySQL error number for `KILL` of an unknown thread.
pub const ER_NO_SUCH_THREAD: u16 = 1094;

/// Client error number for a session that went away mid-query.
pub const CR_SERVER_LOST: u16 = 2013;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows with columns.
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row data.
        rows: Vec<Vec<Value>>,
    },

    /// Return rows affected count (for INSERT/UPDATE/DELETE).
    RowsAffected(u64),

    /// Return a server error.
    Error {
        /// MySQL error number.
        code: u16,
        /// Error message.
        message: String,
    },

    /// Wait, then answer with the inner response.
    ///
    /// A `KILL` of the session ends the wait early with a lost-connection
    /// error.
    Delayed(Duration, Box<MockResponse>),

    /// Never answer; only a `KILL` of the session ends the statement.
    Hang,

    /// Execute a custom handler.
    Custom(Arc<dyn Fn(&str, &[Value]) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", &rows.len())
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Delayed(delay, inner) => {
                f.debug_tuple("Delayed").field(delay).field(inner).finish()
            }
            Self::Hang => f.write_str("Hang"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::RowsAffected(0)
    }

    /// Create a one-row, one-column response.
    pub fn scalar(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Rows {
            columns: vec![column.into()],
            rows: vec![vec![value.into()]],
        }
    }

    /// Create a multi-row response.
    pub fn rows<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create an error response.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Answer with `self` after `delay`.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A statement the server received.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Thread id of the session it ran on.
    pub session: u64,
    /// Statement text.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<Value>,
}

/// Builder for [`MockServer`].
pub struct MockServerBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    connect_delay: Option<Duration>,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::empty(),
            connect_delay: None,
        }
    }

    /// Add a response for a specific statement.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Set the default response for unmatched statements.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Delay every connect handshake.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Build the server.
    pub fn build(self) -> MockServer {
        MockServer {
            state: Arc::new(ServerState {
                responses: Mutex::new(self.responses),
                default_response: self.default_response,
                connect_delay: self.connect_delay,
                next_thread_id: AtomicU64::new(1),
                connects: AtomicU64::new(0),
                fail_connect: AtomicBool::new(false),
                fail_probes: AtomicBool::new(false),
                sessions: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
                statement_seen: Notify::new(),
            }),
        }
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock MySQL server for testing.
///
/// Cloning shares the same server.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<ServerState>,
}

struct ServerState {
    responses: Mutex<HashMap<String, MockResponse>>,
    default_response: MockResponse,
    connect_delay: Option<Duration>,
    next_thread_id: AtomicU64,
    connects: AtomicU64,
    fail_connect: AtomicBool,
    fail_probes: AtomicBool,
    sessions: Mutex<HashMap<u64, Arc<ServerSession>>>,
    log: Mutex<Vec<ExecutedStatement>>,
    statement_seen: Notify,
}

struct ServerSession {
    thread_id: u64,
    dead: AtomicBool,
    killed: Notify,
    events: mpsc::UnboundedSender<ClientError>,
}

impl ServerSession {
    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Terminate the session: running statements fail, and the client's
    /// error channel receives a transport error.
    fn terminate(&self) {
        if !self.dead.swap(true, Ordering::AcqRel) {
            self.killed.notify_waiters();
            // The client may have dropped its receiver already.
            let _ = self.events.send(ClientError::ConnectionClosed);
        }
    }
}

impl MockServer {
    /// Create a server with default settings.
    pub fn new() -> Self {
        MockServerBuilder::new().build()
    }

    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Add or replace a response while the server is running.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.state.responses.lock().insert(sql.into(), response);
    }

    /// Make every following connect handshake fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::Release);
    }

    /// Make every following `SELECT 1` fail.
    pub fn set_fail_probes(&self, fail: bool) {
        self.state.fail_probes.store(fail, Ordering::Release);
    }

    /// Drop a session from the server side, as a network failure would.
    ///
    /// Returns `false` if no such session is open.
    pub fn break_session(&self, thread_id: u64) -> bool {
        match self.session(thread_id) {
            Some(session) => {
                tracing::debug!(thread_id, "mock server breaking session");
                session.terminate();
                true
            }
            None => false,
        }
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.state.sessions.lock().len()
    }

    /// Thread ids of the sessions currently open, ascending.
    pub fn session_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of successful connect handshakes so far.
    pub fn connect_count(&self) -> u64 {
        self.state.connects.load(Ordering::Acquire)
    }

    /// Every statement received so far, in order.
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.log.lock().clone()
    }

    /// Statements received on one session, in order.
    pub fn statements_for(&self, thread_id: u64) -> Vec<String> {
        self.state
            .log
            .lock()
            .iter()
            .filter(|s| s.session == thread_id)
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Statements starting with `prefix` (ASCII case-insensitive).
    pub fn executed_matching(&self, prefix: &str) -> Vec<ExecutedStatement> {
        self.state
            .log
            .lock()
            .iter()
            .filter(|s| starts_with_ignore_case(&s.sql, prefix))
            .cloned()
            .collect()
    }

    /// Wait until a statement starting with `prefix` has been received.
    pub async fn wait_for_statement(&self, prefix: &str) -> ExecutedStatement {
        loop {
            let seen = self.state.statement_seen.notified();
            tokio::pin!(seen);
            seen.as_mut().enable();

            if let Some(found) = self.executed_matching(prefix).into_iter().next() {
                return found;
            }
            seen.await;
        }
    }

    fn session(&self, thread_id: u64) -> Option<Arc<ServerSession>> {
        self.state.sessions.lock().get(&thread_id).cloned()
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("open_sessions", &self.open_sessions())
            .field("connects", &self.connect_count())
            .finish()
    }
}

#[async_trait]
impl Connector for MockServer {
    type Connection = MockConnection;

    async fn connect(&self, options: &ConnectOptions) -> mysql_session::Result<MockConnection> {
        if let Some(delay) = self.state.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_connect.load(Ordering::Acquire) {
            return Err(ClientError::Connection(format!(
                "connect to {} refused",
                options.endpoint()
            )));
        }

        let thread_id = self.state.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(ServerSession {
            thread_id,
            dead: AtomicBool::new(false),
            killed: Notify::new(),
            events: tx,
        });
        self.state.sessions.lock().insert(thread_id, Arc::clone(&session));
        self.state.connects.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(thread_id, "mock server accepted session");

        Ok(MockConnection {
            server: Arc::clone(&self.state),
            session,
            events: Some(rx),
            date_strings: options.date_strings,
            closed: false,
        })
    }
}

/// Client side of a mock session.
pub struct MockConnection {
    server: Arc<ServerState>,
    session: Arc<ServerSession>,
    events: Option<TransportErrors>,
    date_strings: bool,
    closed: bool,
}

impl MockConnection {
    /// Thread id the server assigned to this session.
    pub fn thread_id(&self) -> u64 {
        self.session.thread_id
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.server.log.lock().push(ExecutedStatement {
            session: self.session.thread_id,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.server.statement_seen.notify_waiters();
    }

    fn builtin(&self, sql: &str) -> Option<mysql_session::Result<QueryResult>> {
        if starts_with_ignore_case(sql, "SELECT CONNECTION_ID()") {
            return Some(Ok(QueryResult::scalar(
                "connectionId",
                Value::UInt(self.session.thread_id),
            )));
        }
        if sql.eq_ignore_ascii_case("SELECT 1") {
            if self.server.fail_probes.load(Ordering::Acquire) {
                return Some(Err(ClientError::server(CR_SERVER_LOST, "probe rejected")));
            }
            return Some(Ok(QueryResult::scalar("1", Value::Int(1))));
        }
        if starts_with_ignore_case(sql, "KILL ") {
            return Some(self.kill(sql[5..].trim()));
        }
        if starts_with_ignore_case(sql, "SET time_zone") {
            return Some(Ok(QueryResult::empty()));
        }
        None
    }

    fn kill(&self, target: &str) -> mysql_session::Result<QueryResult> {
        let session = target
            .parse::<u64>()
            .ok()
            .and_then(|id| self.server.sessions.lock().get(&id).cloned());
        match session {
            Some(session) => {
                tracing::debug!(thread_id = session.thread_id, "mock server killing session");
                session.terminate();
                Ok(QueryResult::empty())
            }
            None => Err(ClientError::server(
                ER_NO_SUCH_THREAD,
                format!("Unknown thread id: {target}"),
            )),
        }
    }

    async fn respond(&self, sql: &str, params: &[Value]) -> mysql_session::Result<QueryResult> {
        let mut response = {
            let responses = self.server.responses.lock();
            responses
                .get(sql)
                .cloned()
                .unwrap_or_else(|| self.server.default_response.clone())
        };

        loop {
            response = match response {
                MockResponse::Rows { columns, rows } => {
                    let rows = rows
                        .into_iter()
                        .map(|row| {
                            row.into_iter()
                                .map(|v| if self.date_strings { v.into_date_string() } else { v })
                                .collect()
                        })
                        .collect();
                    return Ok(QueryResult::from_rows(columns, rows));
                }
                MockResponse::RowsAffected(n) => return Ok(QueryResult::affected(n)),
                MockResponse::Error { code, message } => {
                    return Err(ClientError::server(code, message));
                }
                MockResponse::Delayed(delay, inner) => {
                    self.wait_unless_killed(Some(delay)).await?;
                    *inner
                }
                MockResponse::Hang => {
                    self.wait_unless_killed(None).await?;
                    return Ok(QueryResult::empty());
                }
                MockResponse::Custom(handler) => handler(sql, params),
            };
        }
    }

    async fn wait_unless_killed(&self, delay: Option<Duration>) -> mysql_session::Result<()> {
        let killed = self.session.killed.notified();
        tokio::pin!(killed);
        killed.as_mut().enable();
        if self.session.is_dead() {
            return Err(ClientError::ConnectionClosed);
        }

        match delay {
            Some(delay) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => Ok(()),
                    () = &mut killed => Err(ClientError::ConnectionClosed),
                }
            }
            None => {
                killed.await;
                Err(ClientError::ConnectionClosed)
            }
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> mysql_session::Result<QueryResult> {
        if self.closed || self.session.is_dead() {
            return Err(ClientError::ConnectionClosed);
        }
        let sql = sql.trim();
        self.record(sql, params);

        match self.builtin(sql) {
            Some(result) => result,
            None => self.respond(sql, params).await,
        }
    }

    async fn end(&mut self) -> mysql_session::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.server.sessions.lock().remove(&self.session.thread_id);
        if self.session.is_dead() {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    fn take_error_events(&mut self) -> Option<TransportErrors> {
        self.events.take()
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.server.sessions.lock().remove(&self.session.thread_id);
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("thread_id", &self.session.thread_id)
            .field("dead", &self.session.is_dead())
            .field("closed", &self.closed)
            .finish()
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
