use serde::Deserialize;

/// The EventBus itself is unconfigurable (fixed ring capacities); this
/// section only controls whether the controller-to-public projection runs.
#[derive(Debug, Deserialize, Clone)]
pub struct EventBusConfig {
    #[serde(default = "default_true")]
    pub publish_public_challenge_updates: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { publish_public_challenge_updates: default_true() }
    }
}

fn default_true() -> bool {
    true
}
