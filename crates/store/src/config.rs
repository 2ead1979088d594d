/// Configuration for the SQLite-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `sqlx` connection URL, e.g. `sqlite://data/controller.db` or
    /// `sqlite::memory:` for tests.
    pub database_url: String,

    /// Maximum number of pooled connections.
    pub pool_size: u32,

    /// How long an assignment stays exclusive to its runner before the
    /// reaper returns it to `waiting` (default: 5 minutes).
    pub assignment_timeout_secs: i64,

    /// How long an agent may go without a heartbeat before the reaper
    /// marks it `offline` (default: 90 seconds).
    pub agent_timeout_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::from("sqlite://controller.db"),
            pool_size: 5,
            assignment_timeout_secs: 5 * 60,
            agent_timeout_secs: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.pool_size, 5);
        assert_eq!(cfg.assignment_timeout_secs, 300);
        assert_eq!(cfg.agent_timeout_secs, 90);
    }
}
