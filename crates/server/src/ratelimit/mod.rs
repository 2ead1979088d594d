//! Fixed-window rate limiting for the HTTP surface, layered on top of
//! `rfctl_auth::rate_limit::LoginRateLimiter` rather than reinventing the
//! window bookkeeping — the login limiter already implements exactly the
//! "fixed window per source address" shape every tier in this module needs,
//! just parameterized differently per endpoint group.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use rfctl_auth::{LoginRateLimiter, RateLimitTier};

use crate::config::agents::TierConfig as AgentTierConfig;
use crate::config::AgentsConfig;
use crate::config::auth::{AdminMutationsConfig, LoginTierConfig};
use crate::error::ApiError;

fn tier_from(requests_per_window: u32, window_seconds: u64) -> RateLimitTier {
    RateLimitTier { requests_per_window, window: std::time::Duration::from_secs(window_seconds) }
}

/// Two independent windows that must both have budget left (admin
/// mutations: "100/min, 1000/h" — not one window collapsed into the other).
pub struct DualWindowLimiter {
    short: LoginRateLimiter,
    long: LoginRateLimiter,
}

impl DualWindowLimiter {
    fn new(cfg: AdminMutationsConfig) -> Self {
        Self {
            short: LoginRateLimiter::new(tier_from(cfg.per_minute, 60)),
            long: LoginRateLimiter::new(tier_from(cfg.per_hour, 60 * 60)),
        }
    }

    pub async fn check(&self, key: &str) -> Result<(), std::time::Duration> {
        self.short.check(key).await?;
        self.long.check(key).await
    }

    pub async fn cleanup_expired(&self) -> u64 {
        self.short.cleanup_expired().await + self.long.cleanup_expired().await
    }
}

/// Every rate-limited endpoint group's limiter, sized from config at
/// startup.
pub struct RateLimiters {
    pub login: LoginRateLimiter,
    pub admin_mutations: DualWindowLimiter,
    pub heartbeat: LoginRateLimiter,
    pub poll: LoginRateLimiter,
    pub complete: LoginRateLimiter,
    pub log: LoginRateLimiter,
    pub file_upload: LoginRateLimiter,
    pub file_download: LoginRateLimiter,
    pub enrollment: LoginRateLimiter,
    pub provisioning: LoginRateLimiter,
}

impl RateLimiters {
    #[must_use]
    pub fn new(login: LoginTierConfig, admin_mutations: AdminMutationsConfig, agents: &AgentsConfig) -> Self {
        let t = |c: AgentTierConfig| LoginRateLimiter::new(tier_from(c.requests_per_window, c.window_seconds));
        Self {
            login: LoginRateLimiter::new(tier_from(login.requests_per_window, login.window_seconds)),
            admin_mutations: DualWindowLimiter::new(admin_mutations),
            heartbeat: t(agents.heartbeat),
            poll: t(agents.poll),
            complete: t(agents.complete),
            log: t(agents.log),
            file_upload: t(agents.file_upload),
            file_download: t(agents.file_download),
            enrollment: t(agents.enrollment),
            provisioning: t(agents.provisioning),
        }
    }

    /// Periodic sweep the scheduler's reaper loop should drive alongside its
    /// store-backed cleanups, so stale per-address windows don't accumulate
    /// for the lifetime of the process.
    pub async fn cleanup_expired(&self) -> u64 {
        self.login.cleanup_expired().await
        + self.admin_mutations.cleanup_expired().await
        + self.heartbeat.cleanup_expired().await
        + self.poll.cleanup_expired().await
        + self.complete.cleanup_expired().await
        + self.log.cleanup_expired().await
        + self.file_upload.cleanup_expired().await
        + self.file_download.cleanup_expired().await
        + self.enrollment.cleanup_expired().await
        + self.provisioning.cleanup_expired().await
    }
}

/// Best-effort source address: `X-Forwarded-For`'s first hop if present
/// (reverse-proxy deployment, "TLS termination assumed done by a reverse
/// proxy"), otherwise the socket's peer address. Shared by the rate-limit
/// middleware and by handlers (login, TOTP) that need the same address for
/// their security-log entries.
pub fn addr_from_parts(headers: &HeaderMap, connect: Option<SocketAddr>) -> String {
    headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .map(str::to_owned)
    .or_else(|| connect.map(|addr| addr.ip().to_string()))
    .unwrap_or_else(|| "unknown".to_owned())
}

pub fn source_addr(req: &Request) -> String {
    let connect = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
    addr_from_parts(req.headers(), connect)
}

/// Picks one field off `RateLimiters` at route-assembly time. A plain `fn`
/// pointer rather than a closure, so `(AppState, TierSelector)` stays
/// `Clone` and can ride as `from_fn_with_state`'s state without extra
/// `Arc`-wrapping of each individual limiter.
pub type TierSelector = fn(&RateLimiters) -> &LoginRateLimiter;

/// Bound to one limiter via `middleware::from_fn_with_state((state, selector),
/// enforce_tier)`, selected per route group at router-assembly time.
pub async fn enforce_tier(
    State((state, selector)): State<(crate::state::AppState, TierSelector)>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = source_addr(&req);
    selector(&state.rate_limiters)
    .check(&key)
    .await
    .map_err(|retry_after| ApiError::RateLimited { retry_after_secs: retry_after.as_secs()})?;
    Ok(next.run(req).await)
}

pub async fn enforce_dual(
    State(state): State<crate::state::AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = source_addr(&req);
    state
    .rate_limiters
    .admin_mutations
    .check(&key)
    .await
    .map_err(|retry_after| ApiError::RateLimited { retry_after_secs: retry_after.as_secs()})?;
    Ok(next.run(req).await)
}
