pub mod admin;
pub mod agents;
pub mod auth;
pub mod challenges;
pub mod enrollment;
pub mod files;
pub mod provisioning;
pub mod public;
pub mod recording;
pub mod users;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::enforce_csrf;
use crate::ratelimit::{enforce_dual, enforce_tier, RateLimiters, TierSelector};
use crate::state::AppState;
use crate::ws;

/// Assembles the full HTTP/WS surface. Route groups are layered with
/// their own rate limiter before being merged; session auth and agent
/// bearer auth are enforced by each handler's extractor rather than a
/// blanket middleware, since which extractor applies differs per route.
/// CSRF enforcement wraps only the session-mutating admin group: rate
/// limit outermost, then CSRF, then the route-specific auth guard.
#[allow(clippy::too_many_lines)]
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(public::health))
    .route("/public/challenges", get(public::challenges))
    .route("/conference", get(public::conference))
    .route("/frequency-ranges", get(public::frequency_ranges))
    .route("/ws/public", get(ws::public));

    let login_routes = Router::new().route("/auth/login", post(auth::login))
    .route("/auth/setup/verify", post(auth::verify_setup))
    .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.login) as TierSelector), enforce_tier));

    let enrollment_public_routes = Router::new().route("/enrollment/enroll", post(enrollment::enroll))
    .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.enrollment) as TierSelector), enforce_tier));

    let provisioning_public_routes = Router::new().route("/provisioning/provision", post(provisioning::provision))
    .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.provisioning) as TierSelector), enforce_tier));

    let agent_routes = Router::new().route("/agents/register", post(agents::register))
    .route(
        "/agents/{id}/heartbeat",
        post(agents::heartbeat)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.heartbeat) as TierSelector), enforce_tier)),
    )
    .route("/agents/{id}/signout", post(agents::signout))
    .route(
        "/agents/{id}/log",
        post(agents::log)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.log) as TierSelector), enforce_tier)),
    )
    .route(
        "/agents/{id}/task",
        get(agents::task)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.poll) as TierSelector), enforce_tier)),
    )
    .route(
        "/agents/{id}/complete",
        post(agents::complete)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.complete) as TierSelector), enforce_tier)),
    )
    .route("/agents/{id}/recording/start", post(recording::start))
    .route("/agents/{id}/recording/{rid}/complete", post(recording::complete))
    .route("/agents/{id}/recording/{rid}/upload", post(recording::upload))
    .route("/ws/agents", get(ws::agents));

    let file_routes = Router::new().route(
        "/files/{hash}",
        get(files::download)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.file_download) as TierSelector), enforce_tier)),
    )
    .route(
        "/files/upload",
        post(files::upload)
        .layer(middleware::from_fn_with_state((state.clone(), (|r: &RateLimiters| &r.file_upload) as TierSelector), enforce_tier)),
    );

    let admin_reads = Router::new().route("/auth/session", get(auth::session))
    .route("/challenges", get(challenges::list))
    .route("/challenges/{id}", get(challenges::get))
    .route("/admin/dashboard", get(admin::dashboard))
    .route("/admin/runners", get(admin::runners))
    .route("/admin/transmissions", get(admin::transmissions))
    .route("/admin/recordings", get(admin::recordings))
    .route("/admin/logs", get(admin::logs))
    .route("/admin/security-log", get(admin::security_log))
    .route("/admin/control/status", get(admin::status))
    .route("/enrollment/tokens", get(enrollment::list_tokens))
    .route("/provisioning/keys", get(provisioning::list_keys))
    .route("/users", get(users::list))
    .route("/ws/admin", get(ws::admin));

    let admin_mutations = Router::new().route("/auth/logout", post(auth::logout))
    .route("/auth/change-password", post(auth::change_password))
    .route("/auth/setup/complete", post(auth::complete_setup))
    .route("/auth/totp/verify", post(auth::verify_totp))
    .route("/challenges", post(challenges::create))
    .route("/challenges/{id}", put(challenges::update).delete(challenges::delete))
    .route("/challenges/{id}/enable", post(challenges::enable))
    .route("/challenges/{id}/trigger", post(challenges::trigger))
    .route("/challenges/reload", post(challenges::reload))
    .route("/challenges/import", post(challenges::import))
    .route("/admin/control/pause", post(admin::pause))
    .route("/admin/control/resume", post(admin::resume))
    .route("/admin/control/trigger", post(admin::trigger))
    .route("/admin/control/auto-pause", put(admin::set_auto_pause))
    .route("/enrollment/token", post(enrollment::create_token))
    .route("/enrollment/token/{token}", delete(enrollment::delete_token))
    .route("/enrollment/re-enroll/{runner_id}", post(enrollment::re_enroll))
    .route("/provisioning/keys", post(provisioning::create_key))
    .route("/provisioning/keys/{id}", delete(provisioning::delete_key))
    .route("/provisioning/keys/{id}/enabled", put(provisioning::set_enabled))
    .route("/users", post(users::create))
    .route("/users/{username}", put(users::update).delete(users::delete))
    .route("/users/{username}/totp/reset", post(users::reset_totp))
    .route("/users/{username}/password/reset", post(users::reset_password))
    .route("/users/{username}/permissions", get(users::get_permissions))
    .route("/users/{username}/permissions/{permission}", post(users::grant_permission))
    .route("/users/{username}/permissions/{permission}/revoke", post(users::revoke_permission))
    .layer(middleware::from_fn(enforce_csrf))
    .layer(middleware::from_fn_with_state(state.clone(), enforce_dual));

    Router::new().merge(public_routes)
    .merge(login_routes)
    .merge(enrollment_public_routes)
    .merge(provisioning_public_routes)
    .merge(agent_routes)
    .merge(file_routes)
    .merge(admin_reads)
    .merge(admin_mutations)
    .layer(TraceLayer::new_for_http())
    .layer(cors_layer(&state))
    .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<_> = state
    .config
    .server
    .cors_origins
    .iter().filter_map(|o| o.parse().ok())
    .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}
