use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pushed to a listener over the `/agents` WebSocket namespace. The
/// real `transmissions` row doesn't exist yet at this point, hence the
/// placeholder id the listener echoes back on `recording/start`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingAssignment {
    pub assignment_id: String,
    pub challenge_id: String,
    pub transmission_id_placeholder: String,
    pub frequency_hz: u64,
    pub expected_start: DateTime<Utc>,
    pub expected_duration_s: f64,
}

impl RecordingAssignment {
    #[must_use]
    pub fn new(
        challenge_id: &str,
        frequency_hz: u64,
        expected_start: DateTime<Utc>,
        expected_duration: std::time::Duration,
    ) -> Self {
        Self {
            assignment_id: uuid::Uuid::new_v4().to_string(),
            challenge_id: challenge_id.to_owned(),
            transmission_id_placeholder: uuid::Uuid::new_v4().to_string(),
            frequency_hz,
            expected_start,
            expected_duration_s: expected_duration.as_secs_f64(),
        }
    }
}
