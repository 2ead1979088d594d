use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionStatus {
    Transmitting,
    Success,
    Failed,
}

/// One execution of a challenge by a runner. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmission {
    pub id: String,
    pub challenge_id: String,
    pub runner_id: String,
    pub device_id: Option<String>,
    pub frequency_hz: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TransmissionStatus,
    pub error_message: Option<String>,
}
