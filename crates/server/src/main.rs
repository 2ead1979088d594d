//! `rfctl-server` entry point: loads the config document, bootstraps every
//! component, spawns the background reapers, and serves the HTTP/WS
//! surface until signalled to shut down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use rfctl_assignment::AssignmentCoordinator;
use rfctl_auth::{AuthGateway, RateLimitTier};
use rfctl_crypto::{CredentialVault, MasterKey};
use rfctl_enrollment::EnrollmentService;
use rfctl_eventbus::EventBus;
use rfctl_registry::AgentRegistry;
use rfctl_scheduler::Scheduler;
use rfctl_store::Store;

use rfctl_server::config::Config;
use rfctl_server::ratelimit::RateLimiters;
use rfctl_server::state::AppState;
use rfctl_server::ws::ConnectionRegistry;

/// Fleet controller for the CTF SDR conference.
#[derive(Parser, Debug)]
#[command(name = "rfctl-server")]
struct Cli {
    /// Path to the TOML configuration document.
    #[arg(short, long, default_value = "rfctl.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.telemetry.default_level)),
        )
        .init();

    let store = Arc::new(Store::connect(config.store.to_store_config()).await?);
    seed_configured_challenges(&store, &config).await?;

    if let Some(password) = store.bootstrap_if_empty().await? {
        info!("no users found; created disabled bootstrap user 'admin'");
        println!("Initial admin password (shown once): {password}");
    }

    let master_key = MasterKey::load_or_generate(Path::new(&config.store.master_key_path))?;
    let vault = Arc::new(CredentialVault::new(master_key));
    let migrated = store.migrate_legacy_totp_secrets(&vault).await?;
    if !migrated.is_empty() {
        info!(count = migrated.len(), "migrated legacy TOTP secrets to encrypted envelopes");
    }

    let registry = AgentRegistry::new(Arc::clone(&store));
    let scheduler = Scheduler::new(Arc::clone(&store));
    let assignment = AssignmentCoordinator::new();
    let enrollment = EnrollmentService::new(Arc::clone(&store), registry.clone());
    let eventbus = Arc::new(EventBus::new());
    let connections = Arc::new(ConnectionRegistry::new());

    let login_tier = RateLimitTier {
        requests_per_window: config.auth.login.requests_per_window,
        window: Duration::from_secs(config.auth.login.window_seconds),
    };
    let auth = AuthGateway::with_tier(Arc::clone(&store), Arc::clone(&vault), login_tier);
    let rate_limiters = Arc::new(RateLimiters::new(config.auth.login, config.auth.admin_mutations, &config.agents));

    let named_ranges = Arc::new(AppState::named_ranges_from_config(&config));
    let config_path = Arc::new(cli.config);
    let config = Arc::new(config);

    let reaper_handle = rfctl_scheduler::spawn_reapers(Arc::clone(&store), &config.scheduler.to_scheduler_config());
    spawn_cleanup_loop(auth.clone(), Arc::clone(&rate_limiters), enrollment.clone());

    let state = AppState {
        store,
        vault,
        auth,
        registry,
        scheduler,
        assignment,
        enrollment,
        eventbus,
        connections,
        rate_limiters,
        named_ranges,
        config: Arc::clone(&config),
        config_path,
    };

    let app = rfctl_server::api::router(state);
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(host = %config.server.host, port = config.server.port, "rfctl-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    reaper_handle.abort_all();
    Ok(())
}

async fn seed_configured_challenges(store: &Store, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    for seed in &config.challenges {
        if store.get_challenge(&seed.challenge_id).await?.is_none() {
            store
            .create_challenge(&seed.challenge_id, &seed.name, &seed.config, seed.priority)
            .await?;
        }
    }
    Ok(())
}

/// Sweeps the in-memory rate-limit windows, TOTP replay guard, and expired
/// enrollment tokens every minute, alongside the scheduler's store-backed
/// reapers.
fn spawn_cleanup_loop(auth: AuthGateway, rate_limiters: Arc<RateLimiters>, enrollment: EnrollmentService) {
    tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs(60));
            timer.tick().await;
            loop {
                timer.tick().await;
                let _ = auth.cleanup_expired_totp_codes().await;
                let _ = auth.cleanup_rate_limit_windows().await;
                let _ = rate_limiters.cleanup_expired().await;
                if let Err(e) = enrollment.cleanup_expired_tokens().await {
                    tracing::warn!(error = %e, "enrollment token cleanup failed");
                }
            }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
