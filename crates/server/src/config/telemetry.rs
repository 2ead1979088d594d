use serde::Deserialize;

/// Logging configuration for the `tracing` + `tracing-subscriber` stack.
/// `RUST_LOG` always wins when set; `default_level` only applies otherwise.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub default_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { default_level: default_level() }
    }
}

fn default_level() -> String {
    "info".to_owned()
}
