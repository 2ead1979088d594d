use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One spectrum capture of a transmission by a listener. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub challenge_id: String,
    pub transmission_id: String,
    pub listener_id: String,
    pub frequency_hz: u64,
    pub sample_rate: u32,
    pub expected_duration_s: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub image_path: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub error_message: Option<String>,
}
