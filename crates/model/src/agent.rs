use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Runner,
    Listener,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Inclusive frequency range a device can receive or transmit on, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyLimit {
    pub min_hz: u64,
    pub max_hz: u64,
}

impl FrequencyLimit {
    #[must_use]
    pub fn covers(&self, freq_hz: u64) -> bool {
        (self.min_hz..=self.max_hz).contains(&freq_hz)
    }
}

/// A single radio attached to an agent host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub model: String,
    pub name_or_serial: String,
    #[serde(default)]
    pub frequency_limits: Vec<FrequencyLimit>,
    #[serde(default)]
    pub antenna: Option<String>,
    #[serde(default)]
    pub bias_t: Option<bool>,
}

/// A runner or listener host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub hostname: String,
    pub ip: String,
    pub mac: Option<String>,
    pub machine_id: Option<String>,
    pub devices: Vec<Device>,
    /// bcrypt hash of the runner API key, absent for pre-enrollment rows.
    pub api_key_hash: Option<String>,
    pub status: AgentStatus,
    pub enabled: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Any device whose frequency limits cover `freq_hz`.
    #[must_use]
    pub fn device_covering(&self, freq_hz: u64) -> Option<&Device> {
        self.devices
        .iter().find(|d| d.frequency_limits.iter().any(|r| r.covers(freq_hz)))
    }
}
