//! Shared application state: one instance per process, cloned cheaply
//! into every handler since every field is already an `Arc` or internally
//! `Arc`-backed.

use std::path::PathBuf;
use std::sync::Arc;

use rfctl_assignment::{AssignmentCoordinator, NamedFrequencyRanges};
use rfctl_auth::AuthGateway;
use rfctl_crypto::CredentialVault;
use rfctl_enrollment::EnrollmentService;
use rfctl_eventbus::EventBus;
use rfctl_registry::AgentRegistry;
use rfctl_scheduler::Scheduler;
use rfctl_store::Store;

use crate::config::Config;
use crate::ratelimit::RateLimiters;
use crate::ws::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub vault: Arc<CredentialVault>,
    pub auth: AuthGateway,
    pub registry: AgentRegistry,
    pub scheduler: Scheduler,
    pub assignment: AssignmentCoordinator,
    pub enrollment: EnrollmentService,
    pub eventbus: Arc<EventBus>,
    pub connections: Arc<ConnectionRegistry>,
    pub rate_limiters: Arc<RateLimiters>,
    pub named_ranges: Arc<NamedFrequencyRanges>,
    pub config: Arc<Config>,
    /// Path the config document was loaded from, kept for
    /// `POST /challenges/reload` to re-read the on-disk `[[challenges]]`.
    pub config_path: Arc<PathBuf>,
}

impl AppState {
    #[must_use]
    pub fn named_ranges_from_config(config: &Config) -> NamedFrequencyRanges {
        config
            .frequency_ranges
            .iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    rfctl_model::ManualRange { min_hz: r.min_hz, max_hz: r.max_hz },
                )
            })
            .collect()
    }
}
