//! The few statements the driver issues on its own behalf.

use mysql_driver_pool::config::DEFAULT_HEALTH_CHECK_QUERY;

/// MySQL statement helpers.
///
/// Query building proper lives outside this crate; this only covers what the
/// driver itself needs plus identifier quoting for callers building SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Returns the server-assigned id of the current session.
    pub const SESSION_ID_QUERY: &'static str = "SELECT CONNECTION_ID() AS connectionId";

    /// Column holding the id in [`Self::SESSION_ID_QUERY`].
    pub const SESSION_ID_COLUMN: &'static str = "connectionId";

    /// Liveness probe.
    pub const PROBE: &'static str = DEFAULT_HEALTH_CHECK_QUERY;

    /// Dialect name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        "mysql"
    }

    /// Statement that terminates session `id` on the server.
    #[must_use]
    pub fn kill(id: u64) -> String {
        format!("KILL {id}")
    }

    /// Statement that sets the session time zone.
    ///
    /// `tz` must have passed [`crate::config::validate_time_zone`].
    #[must_use]
    pub fn set_time_zone(tz: &str) -> String {
        format!("SET time_zone = '{tz}'")
    }

    /// Quote an identifier with backticks.
    #[must_use]
    pub fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}
