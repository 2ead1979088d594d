//! In-memory TOTP replay-protection table: `(username, code) →
//! first_use_time` for 120s, so a captured code can't be replayed within its
//! validity window.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// A code is valid for one 30s step plus ±1 step of clock skew (90s total);
/// 120s of replay tracking outlives that window with margin, matching the
/// original's `timedelta(seconds=120)` cleanup threshold.
const REPLAY_WINDOW: Duration = Duration::from_secs(120);

pub struct TotpReplayGuard {
    used: Mutex<HashMap<(String, String), Instant>>,
}

impl Default for TotpReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl TotpReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            used: Mutex::new(HashMap::new()),
        }
    }

    /// Marks `(username, code)` as used if it hasn't been seen within the
    /// replay window. Returns `false` on a replay, in which case the caller
    /// must reject the verification even though the code itself still
    /// checks out against the TOTP secret.
    pub async fn mark_used(&self, username: &str, code: &str) -> bool {
        let mut used = self.used.lock().await;
        let key = (username.to_owned(), code.to_owned());
        if let Some(seen_at) = used.get(&key)
        && seen_at.elapsed() < REPLAY_WINDOW
        {
            return false;
        }
        used.insert(key, Instant::now());
        true
    }

    /// Periodic sweep (driven by the scheduler's reaper loop) dropping
    /// entries older than the replay window.
    pub async fn cleanup_expired(&self) -> u64 {
        let mut used = self.used.lock().await;
        let before = used.len();
        used.retain(|_, seen_at| seen_at.elapsed() < REPLAY_WINDOW);
        (before - used.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_use_is_accepted_second_is_rejected() {
        let guard = TotpReplayGuard::new();
        assert!(guard.mark_used("alice", "123456").await);
        assert!(!guard.mark_used("alice", "123456").await);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_usernames_or_codes_do_not_collide() {
        let guard = TotpReplayGuard::new();
        assert!(guard.mark_used("alice", "123456").await);
        assert!(guard.mark_used("bob", "123456").await);
        assert!(guard.mark_used("alice", "654321").await);
    }

    #[tokio::test(start_paused = true)]
    async fn code_is_usable_again_after_the_replay_window() {
        let guard = TotpReplayGuard::new();
        assert!(guard.mark_used("alice", "123456").await);
        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(guard.mark_used("alice", "123456").await);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_only_expired_entries() {
        let guard = TotpReplayGuard::new();
        guard.mark_used("alice", "111111").await;
        tokio::time::advance(Duration::from_secs(121)).await;
        guard.mark_used("bob", "222222").await;
        let removed = guard.cleanup_expired().await;
        assert_eq!(removed, 1);
    }
}
