use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TierConfig {
    pub requests_per_window: u32,
    pub window_seconds: u64,
}

const fn tier(requests_per_window: u32, window_seconds: u64) -> TierConfig {
    TierConfig { requests_per_window, window_seconds }
}

/// Per-endpoint-group rate limits for agent (runner/listener) traffic and
/// the enrollment/provisioning/file surfaces that sit alongside it.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    /// Heartbeat, task poll, complete, and log submission each get their own
    /// window but share the same default shape ("1000/min each").
    #[serde(default = "default_agent_action")]
    pub heartbeat: TierConfig,
    #[serde(default = "default_agent_action")]
    pub poll: TierConfig,
    #[serde(default = "default_agent_action")]
    pub complete: TierConfig,
    #[serde(default = "default_agent_action")]
    pub log: TierConfig,
    #[serde(default = "default_file_upload")]
    pub file_upload: TierConfig,
    #[serde(default = "default_file_download")]
    pub file_download: TierConfig,
    #[serde(default = "default_enrollment")]
    pub enrollment: TierConfig,
    #[serde(default = "default_provisioning")]
    pub provisioning: TierConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            heartbeat: default_agent_action(),
            poll: default_agent_action(),
            complete: default_agent_action(),
            log: default_agent_action(),
            file_upload: default_file_upload(),
            file_download: default_file_download(),
            enrollment: default_enrollment(),
            provisioning: default_provisioning(),
        }
    }
}

fn default_agent_action() -> TierConfig {
    tier(1000, 60)
}

fn default_file_upload() -> TierConfig {
    tier(100, 60)
}

fn default_file_download() -> TierConfig {
    tier(500, 60)
}

fn default_enrollment() -> TierConfig {
    tier(10, 60 * 60)
}

fn default_provisioning() -> TierConfig {
    tier(100, 60 * 60)
}
