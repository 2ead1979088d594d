use std::time::Duration;

/// Cadence for the background reapers ("each run on a dedicated timer
/// task at a 30-60s cadence").
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub reap_stale_assignments_interval: Duration,
    pub reap_stale_agents_interval: Duration,
    pub cleanup_expired_sessions_interval: Duration,
    pub cleanup_expired_tokens_interval: Duration,
    pub reap_stale_temporary_users_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reap_stale_assignments_interval: Duration::from_secs(30),
            reap_stale_agents_interval: Duration::from_secs(30),
            cleanup_expired_sessions_interval: Duration::from_secs(60),
            cleanup_expired_tokens_interval: Duration::from_secs(60),
            reap_stale_temporary_users_interval: Duration::from_secs(60),
        }
    }
}
