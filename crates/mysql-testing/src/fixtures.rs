//! Test fixture utilities.

use std::time::Duration;

use mysql_session::{ConnectOptions, Credentials, Value};

use crate::mock_server::MockResponse;

/// Statement that never finishes on a [`MockServer`](crate::MockServer)
/// built with [`with_long_query`].
pub const LONG_QUERY: &str = "SELECT SLEEP(3600)";

/// Connect options pointing at the mock server.
#[must_use]
pub fn mock_options() -> ConnectOptions {
    ConnectOptions::new()
        .host("mock")
        .database("test")
        .credentials(Credentials::new("test", "test"))
}

/// Register [`LONG_QUERY`] as a statement that only ends when killed.
#[must_use]
pub fn with_long_query(builder: crate::MockServerBuilder) -> crate::MockServerBuilder {
    builder.with_response(LONG_QUERY, MockResponse::Hang)
}

/// A two-row `users` result.
#[must_use]
pub fn users() -> MockResponse {
    MockResponse::rows(
        ["id", "name"],
        vec![
            vec![Value::Int(1), Value::from("alice")],
            vec![Value::Int(2), Value::from("bob")],
        ],
    )
}

/// A response that answers `inner` after `delay`.
#[must_use]
pub fn slow(delay: Duration, inner: MockResponse) -> MockResponse {
    inner.delayed(delay)
}
