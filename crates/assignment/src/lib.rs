//! The controller's AssignmentCoordinator: sits between the
//! `GET /agents/{id}/task` handler and the Scheduler, resolving a picked
//! challenge's frequency, estimating its duration, and (opportunistically)
//! selecting a listener to record it.

pub mod duration;
pub mod error;
pub mod frequency;
pub mod listener;
pub mod recording_assignment;

use chrono::Utc;
use rfctl_model::{Agent, Challenge, ChallengeConfig};

pub use duration::estimate_duration;
pub use error::AssignmentError;
pub use frequency::{resolve_frequency, resolved_runner_config, NamedFrequencyRanges};
pub use listener::select_listener;
pub use recording_assignment::RecordingAssignment;

/// Everything the task handler needs after a challenge is assigned: the
/// config to hand the runner and a listener assignment to push, if any.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub runner_config: ChallengeConfig,
    pub frequency_hz: u64,
    pub expected_duration: std::time::Duration,
    pub recording_assignment: Option<(String, RecordingAssignment)>,
}

#[derive(Clone, Default)]
pub struct AssignmentCoordinator;

impl AssignmentCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolves frequency and duration, then (if a covering listener is
    /// online) builds the `recording_assignment` event for it. Returns the
    /// listener's agent id alongside the event so the caller knows which
    /// `/agents` socket to push it to.
    pub fn resolve(
        &self,
        challenge: &Challenge,
        named_ranges: &NamedFrequencyRanges,
        listeners: &[Agent],
    ) -> Result<Resolution, AssignmentError> {
        let mut rng = rand::thread_rng();
        let frequency_hz =
        resolve_frequency(&challenge.config.frequency, named_ranges, &mut rng)?;
        let runner_config = resolved_runner_config(&challenge.config, frequency_hz);
        let expected_duration = estimate_duration(&challenge.config);

        let recording_assignment = select_listener(listeners, frequency_hz).map(|(agent, _device)| {
                let assignment = RecordingAssignment::new(
                    &challenge.challenge_id,
                    frequency_hz,
                    Utc::now(),
                    expected_duration,
                );
                (agent.agent_id.clone(), assignment)
        });

        Ok(Resolution {
                runner_config,
                frequency_hz,
                expected_duration,
                recording_assignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rfctl_model::{ChallengeStatus, FrequencySpec, PublicVisibility};

    fn challenge() -> Challenge {
        Challenge {
            challenge_id: "c1".to_owned(),
            name: "Challenge 1".to_owned(),
            config: ChallengeConfig {
                modulation: "cw".to_owned(),
                frequency: FrequencySpec::Fixed { frequency: 7_050_000 },
                min_delay: 60,
                max_delay: 90,
                flag: Some("flag{x}".into()),
                flag_file_hash: None,
                public_view: PublicVisibility::default(),
                extra: {
                    let mut m = serde_json::Map::new();
                    m.insert("speed".to_owned(), serde_json::json!(20));
                    m
                },
            },
            enabled: true,
            status: ChallengeStatus::Assigned,
            priority: 0,
            assigned_to: Some("runner-1".to_owned()),
            assigned_at: Some(Utc::now()),
            assignment_expires: None,
            last_tx_time: None,
            transmission_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolve_with_no_listeners_has_no_recording_assignment() {
        let coordinator = AssignmentCoordinator::new();
        let resolution = coordinator
        .resolve(&challenge(), &NamedFrequencyRanges::new(), &[])
        .unwrap();
        assert_eq!(resolution.frequency_hz, 7_050_000);
        assert!(resolution.recording_assignment.is_none());
    }
}
