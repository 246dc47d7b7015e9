//! # mysql-testing
//!
//! Test infrastructure for the MySQL pool and driver.
//!
//! This crate provides an in-process mock server implementing the
//! [`mysql_session::Connector`] contract, so pool and executor behavior can be
//! tested without a real database.
//!
//! ## Features
//!
//! - Server thread ids and `SELECT CONNECTION_ID()`
//! - `KILL <id>` that terminates the target session and its running statement
//! - Scripted responses: rows, errors, delays and statements that never finish
//! - Failure injection: refused connects, failed probes, broken sessions
//! - Statement log keyed by session for assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_testing::{MockResponse, MockServer, fixtures};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockServer::builder()
//!         .with_response("SELECT SLEEP(10)", MockResponse::Hang)
//!         .build();
//!
//!     let pool = Pool::new(server.clone(), fixtures::mock_options(), PoolConfig::new())?;
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{
    CR_SERVER_LOST, ER_NO_SUCH_THREAD, ExecutedStatement, MockConnection, MockResponse,
    MockServer, MockServerBuilder,
};
