use chrono::{DateTime, Utc};
use rfctl_model::{AgentStatus, PublicChallengeView};
use serde::{Deserialize, Serialize};

/// A published event. Tagged with `type` on the wire so WebSocket
/// clients can dispatch on a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Log {
        level: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RunnerStatus {
        agent_id: String,
        status: AgentStatus,
        timestamp: DateTime<Utc>,
    },
    ListenerStatus {
        agent_id: String,
        status: AgentStatus,
        timestamp: DateTime<Utc>,
    },
    ChallengeAssigned {
        challenge_id: String,
        runner_id: String,
        timestamp: DateTime<Utc>,
    },
    TransmissionComplete {
        transmission_id: String,
        challenge_id: String,
        runner_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    /// Pushed to exactly one listener's `/agents` socket, never broadcast
    ///: the `AssignmentCoordinator` addresses this to whichever
    /// listener it picked, via `ConnectionRegistry::push` rather than
    /// `EventBus::publish_*`.
    RecordingAssignment {
        assignment_id: String,
        challenge_id: String,
        transmission_id_placeholder: String,
        frequency_hz: u64,
        expected_start: DateTime<Utc>,
        expected_duration_s: f64,
    },
    RecordingStarted {
        recording_id: String,
        listener_id: String,
        timestamp: DateTime<Utc>,
    },
    RecordingComplete {
        recording_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    RunnerEnrolled {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    SystemControl {
        action: String,
        by_username: String,
        timestamp: DateTime<Utc>,
    },
    /// Public-safe diff; callers build this from
    /// [`rfctl_model::Challenge::to_public_view()`], never from the raw row.
    ChallengesUpdate {
        challenges: Vec<PublicChallengeView>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Log {.. } => "log",
            Self::RunnerStatus {.. } => "runner_status",
            Self::ListenerStatus {.. } => "listener_status",
            Self::ChallengeAssigned {.. } => "challenge_assigned",
            Self::TransmissionComplete {.. } => "transmission_complete",
            Self::RecordingAssignment {.. } => "recording_assignment",
            Self::RecordingStarted {.. } => "recording_started",
            Self::RecordingComplete {.. } => "recording_complete",
            Self::RunnerEnrolled {.. } => "runner_enrolled",
            Self::SystemControl {.. } => "system_control",
            Self::ChallengesUpdate {.. } => "challenges_update",
        }
    }
}
