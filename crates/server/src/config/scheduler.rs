use serde::Deserialize;

/// Reaper cadences. Mirrors `rfctl_scheduler::SchedulerConfig`'s field
/// names so the conversion below is a straight field-for-field copy.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfigToml {
    #[serde(default = "default_30")]
    pub reap_stale_assignments_interval_secs: u64,
    #[serde(default = "default_30")]
    pub reap_stale_agents_interval_secs: u64,
    #[serde(default = "default_60")]
    pub cleanup_expired_sessions_interval_secs: u64,
    #[serde(default = "default_60")]
    pub cleanup_expired_tokens_interval_secs: u64,
    #[serde(default = "default_60")]
    pub reap_stale_temporary_users_interval_secs: u64,
}

impl Default for SchedulerConfigToml {
    fn default() -> Self {
        Self {
            reap_stale_assignments_interval_secs: default_30(),
            reap_stale_agents_interval_secs: default_30(),
            cleanup_expired_sessions_interval_secs: default_60(),
            cleanup_expired_tokens_interval_secs: default_60(),
            reap_stale_temporary_users_interval_secs: default_60(),
        }
    }
}

fn default_30() -> u64 {
    30
}

fn default_60() -> u64 {
    60
}

impl SchedulerConfigToml {
    #[must_use]
    pub fn to_scheduler_config(&self) -> rfctl_scheduler::SchedulerConfig {
        use std::time::Duration;
        rfctl_scheduler::SchedulerConfig {
            reap_stale_assignments_interval: Duration::from_secs(self.reap_stale_assignments_interval_secs),
            reap_stale_agents_interval: Duration::from_secs(self.reap_stale_agents_interval_secs),
            cleanup_expired_sessions_interval: Duration::from_secs(self.cleanup_expired_sessions_interval_secs),
            cleanup_expired_tokens_interval: Duration::from_secs(self.cleanup_expired_tokens_interval_secs),
            reap_stale_temporary_users_interval: Duration::from_secs(self.reap_stale_temporary_users_interval_secs),
        }
    }
}
