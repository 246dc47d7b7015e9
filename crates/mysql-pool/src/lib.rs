//! # mysql-driver-pool
//!
//! Bounded pool of MySQL sessions with borrow-time validation and idle
//! eviction.
//!
//! ## Features
//!
//! - Hard bound on live sessions (`max_connections`, default 8)
//! - Liveness probe (`SELECT 1`) before every checkout
//! - Idle eviction on a fixed sweep, shrinking toward `min_connections`
//! - Acquire timeout, surfaced as [`PoolError::Exhausted`]
//! - Sessions hit by an asynchronous transport error are never reused
//! - Errors that belong to one session go to an [`ErrorSink`], not to callers
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_driver_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .max_connections(4)
//!     .idle_timeout(Duration::from_secs(60));
//!
//! let pool = Pool::new(connector, connect_options, config)?;
//! let mut session = pool.get().await?;
//! session.execute("SELECT 1", &[]).await?;
//! session.release().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod pool;
pub mod session;
pub mod sink;

pub use config::PoolConfig;
pub use error::PoolError;
pub use factory::ConnectionFactory;
pub use lifecycle::{SessionHealth, SessionMetadata, SessionState};
pub use pool::{Pool, PoolBuilder, PoolStats, PoolStatus, PooledSession};
pub use session::Session;
pub use sink::{ErrorSink, LogSink};
