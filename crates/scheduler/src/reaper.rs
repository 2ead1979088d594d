//! Background timer tasks: stale assignments, stale agents, expired
//! sessions, expired enrollment tokens, stale temporary users. Each skips
//! the first immediate tick, logs a count on success, and warns and keeps
//! looping on error.

use std::sync::Arc;
use std::time::Duration;

use rfctl_store::Store;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SchedulerConfig;

/// Handle to the five spawned reaper tasks. Dropping or aborting the handles
/// stops the corresponding loop; the tasks otherwise run for the life of the
/// process.
pub struct ReaperHandle {
    pub stale_assignments: JoinHandle<()>,
    pub stale_agents: JoinHandle<()>,
    pub expired_sessions: JoinHandle<()>,
    pub expired_tokens: JoinHandle<()>,
    pub stale_temporary_users: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn abort_all(&self) {
        self.stale_assignments.abort();
        self.stale_agents.abort();
        self.expired_sessions.abort();
        self.expired_tokens.abort();
        self.stale_temporary_users.abort();
    }
}

fn spawn_loop<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> JoinHandle<()>
where
F: FnMut() -> Fut + Send + 'static,
Fut: std::future::Future<Output = Result<u64, rfctl_store::StoreError>> + Send,
{
    tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so reapers don't
            // all fire at startup before anything has had a chance to go stale.
            timer.tick().await;
            loop {
                timer.tick().await;
                match tick().await {
                    Ok(0) => {}
                    Ok(n) => info!(task = name, count = n, "reaper ran"),
                    Err(e) => warn!(task = name, error = %e, "reaper failed"),
                }
            }
    })
}

/// Spawns the five reaper loops against a shared `Store`.
pub fn spawn_reapers(store: Arc<Store>, config: &SchedulerConfig) -> ReaperHandle {
    let s = Arc::clone(&store);
    let stale_assignments = spawn_loop(
        "reap_stale_assignments",
        config.reap_stale_assignments_interval,
        move || {
            let s = Arc::clone(&s);
            async move { s.reap_stale_assignments().await }
        },
    );

    let s = Arc::clone(&store);
    let stale_agents = spawn_loop(
        "reap_stale_agents",
        config.reap_stale_agents_interval,
        move || {
            let s = Arc::clone(&s);
            async move { Ok(s.reap_stale_agents().await?.len() as u64) }
        },
    );

    let s = Arc::clone(&store);
    let expired_sessions = spawn_loop(
        "cleanup_expired_sessions",
        config.cleanup_expired_sessions_interval,
        move || {
            let s = Arc::clone(&s);
            async move { s.cleanup_expired_sessions().await }
        },
    );

    let s = Arc::clone(&store);
    let expired_tokens = spawn_loop(
        "cleanup_expired_tokens",
        config.cleanup_expired_tokens_interval,
        move || {
            let s = Arc::clone(&s);
            async move { s.cleanup_expired_tokens().await }
        },
    );

    let s = Arc::clone(&store);
    let stale_temporary_users = spawn_loop(
        "reap_stale_temporary_users",
        config.reap_stale_temporary_users_interval,
        move || {
            let s = Arc::clone(&s);
            async move { Ok(s.reap_stale_temporary_users().await?.len() as u64) }
        },
    );

    ReaperHandle {
        stale_assignments,
        stale_agents,
        expired_sessions,
        expired_tokens,
        stale_temporary_users,
    }
}
