//! # mysql-session
//!
//! Client contract consumed by the pooled MySQL driver.
//!
//! This crate does not speak the MySQL wire protocol. It describes what the
//! pool and the cancellable executor need from an underlying point-to-point
//! client: open a session, run a statement, close the session, and report
//! asynchronous transport failures.
//!
//! ## Contract
//!
//! - [`Connector::connect`] opens one session from [`ConnectOptions`]
//! - [`Connection::execute`] runs a statement with positional parameters
//! - [`Connection::end`] closes the session
//! - [`Connection::take_error_events`] hands out the error-notification channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_session::{ConnectOptions, Connection, Connector, Value};
//!
//! let options = ConnectOptions::new().host("db.internal").database("analytics");
//! let mut conn = connector.connect(&options).await?;
//!
//! let result = conn.execute("SELECT ? + 1 AS answer", &[Value::Int(41)]).await?;
//! assert_eq!(result.first_row().and_then(|r| r.get("answer")), Some(&Value::Int(42)));
//!
//! conn.end().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod options;
pub mod value;

pub use connection::{Connection, Connector, TransportErrors};
pub use error::{ClientError, Result};
pub use options::{ConnectOptions, Credentials, SslOptions, DEFAULT_PORT, WIRE_TIMEZONE};
pub use value::{QueryResult, Row, Value};
