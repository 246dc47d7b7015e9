//! Pool configuration.

use std::sync::Arc;
use std::time::Duration;

/// Default liveness probe.
pub const DEFAULT_HEALTH_CHECK_QUERY: &str = "SELECT 1";

/// Default maximum number of live sessions.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Configuration for the session pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of idle sessions the sweep keeps the pool topped up to.
    pub min_connections: u32,

    /// Maximum number of live sessions (idle plus checked out).
    pub max_connections: u32,

    /// Time to wait for a session before failing with `Exhausted`.
    pub acquire_timeout: Duration,

    /// Idle time after which a session is evicted unconditionally.
    pub idle_timeout: Duration,

    /// Idle time after which a session is evicted as long as more than
    /// `min_connections` would stay idle.
    pub soft_idle_timeout: Duration,

    /// Interval between eviction sweeps. `Duration::ZERO` disables the sweep.
    pub eviction_interval: Duration,

    /// Whether to probe idle sessions before handing them out.
    pub test_on_borrow: bool,

    /// Liveness probe (defaults to "SELECT 1").
    ///
    /// The query should be lightweight and return quickly.
    pub health_check_query: Arc<str>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(30),
            soft_idle_timeout: Duration::from_secs(30),
            eviction_interval: Duration::from_secs(10),
            test_on_borrow: true,
            health_check_query: Arc::from(DEFAULT_HEALTH_CHECK_QUERY),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of idle sessions.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of live sessions.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the hard idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the soft idle timeout.
    #[must_use]
    pub fn soft_idle_timeout(mut self, timeout: Duration) -> Self {
        self.soft_idle_timeout = timeout;
        self
    }

    /// Set the eviction sweep interval.
    #[must_use]
    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Enable or disable validation on borrow.
    #[must_use]
    pub fn test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    /// Set a custom liveness probe.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mysql_driver_pool::PoolConfig;
    ///
    /// let config = PoolConfig::new().health_check_query("DO 1");
    /// assert_eq!(&*config.health_check_query, "DO 1");
    /// ```
    #[must_use]
    pub fn health_check_query(mut self, query: impl Into<Arc<str>>) -> Self {
        self.health_check_query = query.into();
        self
    }

    /// Check whether the eviction sweep should run at all.
    #[must_use]
    pub fn eviction_enabled(&self) -> bool {
        !self.eviction_interval.is_zero()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.max_connections == 0 {
            return Err(crate::error::PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(crate::error::PoolError::Configuration(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(crate::error::PoolError::Configuration(
                "acquire_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
