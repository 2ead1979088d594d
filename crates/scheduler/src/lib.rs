//! The controller's Scheduler: global pause/auto-pause gating in
//! front of `Store::assign_next_challenge`, plus the background reaper loop.
//!
//! The per-challenge readiness/timing logic itself lives in `rfctl-store`
//! (it has to be atomic with the `status` column flip); this crate is the
//! thinner layer above it that can afford to read `system_state` without
//! a transaction.

pub mod config;
mod gating;
pub mod reaper;

use std::sync::Arc;

use chrono::Local;
use rfctl_model::{Challenge, SystemStateKey};
use rfctl_store::{Store, StoreError};

pub use config::SchedulerConfig;
pub use reaper::{spawn_reapers, ReaperHandle};

/// Snapshot of the gating state, as surfaced by `GET /admin/control/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub paused: bool,
    pub auto_paused: bool,
    pub auto_pause_daily: bool,
    pub day_start: String,
    pub end_of_day: String,
}

/// Thin wrapper around a `Store` that applies the manual/auto-pause gate
/// before delegating to the assignment transaction.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<Store>,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// If paused, hand back `NoneAvailable` without touching the
    /// Store's assignment heap. Otherwise evaluate the daily auto-pause
    /// window and delegate.
    pub async fn assign_next_challenge(&self, runner_id: &str) -> Result<Challenge, StoreError> {
        if self.store.get_bool_state(SystemStateKey::Paused).await? {
            return Err(StoreError::NoneAvailable);
        }

        if self.update_auto_pause_gate().await? {
            return Err(StoreError::NoneAvailable);
        }

        self.store.assign_next_challenge(runner_id).await
    }

    /// Evaluates `auto_pause_daily` against the controller's local wall
    /// clock and keeps the `auto_paused` flag in sync. Returns whether the
    /// window currently applies.
    async fn update_auto_pause_gate(&self) -> Result<bool, StoreError> {
        if !self
        .store
        .get_bool_state(SystemStateKey::AutoPauseDaily)
        .await?
        {
            if self.store.get_bool_state(SystemStateKey::AutoPaused).await? {
                self.store
                .set_bool_state(SystemStateKey::AutoPaused, false)
                .await?;
            }
            return Ok(false);
        }

        let day_start = self
        .store
        .get_state(SystemStateKey::DayStart)
        .await?
        .unwrap_or_else(|| "08:00".to_owned());
        let end_of_day = self
        .store
        .get_state(SystemStateKey::EndOfDay)
        .await?
        .unwrap_or_else(|| "20:00".to_owned());

        let now = Local::now().time();
        let within_window = gating::in_wrapping_interval(
            now,
            gating::parse_hhmm(&end_of_day),
            gating::parse_hhmm(&day_start),
        );

        self.store
        .set_bool_state(SystemStateKey::AutoPaused, within_window)
        .await?;
        Ok(within_window)
    }

    /// Manual pause. Does not touch `auto_paused`.
    pub async fn pause(&self) -> Result<(), StoreError> {
        self.store.set_bool_state(SystemStateKey::Paused, true).await
    }

    /// Manual resume wins over the daily schedule ("manual override
    /// wins"), so it clears `auto_paused` too.
    pub async fn resume(&self) -> Result<(), StoreError> {
        self.store.set_bool_state(SystemStateKey::Paused, false).await?;
        self.store
        .set_bool_state(SystemStateKey::AutoPaused, false)
        .await
    }

    pub async fn trigger_challenge_now(&self, challenge_id: &str) -> Result<(), StoreError> {
        self.store.trigger_challenge_now(challenge_id).await
    }

    pub async fn status(&self) -> Result<SchedulerStatus, StoreError> {
        Ok(SchedulerStatus {
                paused: self.store.get_bool_state(SystemStateKey::Paused).await?,
                auto_paused: self.store.get_bool_state(SystemStateKey::AutoPaused).await?,
                auto_pause_daily: self
                .store
                .get_bool_state(SystemStateKey::AutoPauseDaily)
                .await?,
                day_start: self
                .store
                .get_state(SystemStateKey::DayStart)
                .await?
                .unwrap_or_else(|| "08:00".to_owned()),
                end_of_day: self
                .store
                .get_state(SystemStateKey::EndOfDay)
                .await?
                .unwrap_or_else(|| "20:00".to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfctl_model::{ChallengeConfig, FrequencySpec, PublicVisibility};

    async fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(rfctl_store::test_store().await))
    }

    fn cfg() -> ChallengeConfig {
        ChallengeConfig {
            modulation: "cw".to_owned(),
            frequency: FrequencySpec::Fixed { frequency: 7_050_000 },
            min_delay: 1,
            max_delay: 2,
            flag: Some("flag{x}".into()),
            flag_file_hash: None,
            public_view: PublicVisibility::default(),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn manual_pause_blocks_assignment() {
        let sched = scheduler().await;
        sched
        .store.create_challenge("c1", "Challenge 1", &cfg(), 0)
        .await
        .unwrap();
        sched.pause().await.unwrap();
        let err = sched.assign_next_challenge("runner-1").await.unwrap_err();
        assert!(matches!(err, StoreError::NoneAvailable));
    }

    #[tokio::test]
    async fn resume_clears_manual_and_auto_pause() {
        let sched = scheduler().await;
        sched.pause().await.unwrap();
        sched
        .store.set_bool_state(rfctl_model::SystemStateKey::AutoPaused, true)
        .await
        .unwrap();
        sched.resume().await.unwrap();
        let status = sched.status().await.unwrap();
        assert!(!status.paused);
        assert!(!status.auto_paused);
    }

    #[tokio::test]
    async fn unpaused_assignment_succeeds() {
        let sched = scheduler().await;
        sched
        .store.create_challenge("c1", "Challenge 1", &cfg(), 0)
        .await
        .unwrap();
        let challenge = sched.assign_next_challenge("runner-1").await.unwrap();
        assert_eq!(challenge.challenge_id, "c1");
    }
}
