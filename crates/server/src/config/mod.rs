pub mod agents;
pub mod auth;
mod eventbus;
mod scheduler;
mod server;
mod store;
mod telemetry;

pub use agents::AgentsConfig;
pub use auth::AuthConfig;
pub use eventbus::EventBusConfig;
pub use scheduler::SchedulerConfigToml;
pub use server::ServerConfig;
pub use store::StoreConfigToml;
pub use telemetry::TelemetryConfig;

use std::collections::HashMap;
use std::path::Path;

use rfctl_model::ChallengeConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration document, loaded as TOML, one sub-struct per
/// component.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfigToml,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfigToml,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub eventbus: EventBusConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Named frequency ranges a `FrequencySpec::Named` can draw from (,
    /// ), keyed by name.
    #[serde(default)]
    pub frequency_ranges: HashMap<String, RangeToml>,
    /// Conference metadata surfaced verbatim at `GET /conference`.
    #[serde(default)]
    pub conference: ConferenceConfig,
    /// Optional challenges seeded at startup and re-applied by
    /// `POST /challenges/reload` ("a configuration document... optional
    /// challenges").
    #[serde(default)]
    pub challenges: Vec<ChallengeSeed>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// A challenge definition as it appears in the config document's
/// `[[challenges]]` array, mirroring the shape a CRUD `POST /challenges`
/// body or an import file also carries.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeSeed {
    pub challenge_id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub config: ChallengeConfig,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RangeToml {
    pub min_hz: u64,
    pub max_hz: u64,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConferenceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}
