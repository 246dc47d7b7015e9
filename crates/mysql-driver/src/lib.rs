//! # mysql-driver
//!
//! Pooled MySQL driver with server-side query cancellation.
//!
//! Every query borrows a session from a bounded pool, looks up the server's
//! id for that session, sets the session time zone, runs the statement and
//! hands the session back. Cancelling a query sends `KILL <id>` from a
//! second pooled session.
//!
//! ## Features
//!
//! - Bounded session pool with validation on borrow and idle eviction
//! - Cancellation handle per query; always wins once requested
//! - Session time zone applied before every statement
//! - Configuration from `MYSQL_*` environment variables with caller overrides
//! - Connectivity check that leaves the pool untouched
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_driver::{Driver, DriverConfig};
//!
//! let config = DriverConfig::from_env()?.store_timezone("+05:00");
//! let driver = Driver::new(connector, config)?;
//!
//! driver.test_connection().await?;
//!
//! let query = driver.query("SELECT * FROM orders WHERE id = ?", vec![42i64.into()]);
//! let cancel = query.cancel_handle();
//! let rows = query.await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;

pub use cancel::CancelHandle;
pub use config::{DEFAULT_STORE_TIMEZONE, DriverConfig, validate_time_zone};
pub use dialect::MySqlDialect;
pub use error::{DriverError, Result};
pub use executor::{CancellableQuery, Driver, DriverSession};

// Re-export the pool and client contract so callers need one dependency.
pub use mysql_driver_pool::{ErrorSink, LogSink, PoolConfig, PoolError, PoolStats, PoolStatus};
pub use mysql_session::{
    ClientError, ConnectOptions, Connection, Connector, Credentials, QueryResult, Row, SslOptions,
    Value,
};
