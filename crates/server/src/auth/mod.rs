//! Session-cookie authentication and CSRF enforcement for the admin surface
//!. Agent (runner/listener) bearer authentication lives in
//! [`agent`] instead, since it binds to host identity rather than a
//! cookie/CSRF pair.

pub mod agent;

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use rfctl_model::{Session, User};

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";
pub const CSRF_COOKIE: &str = "csrf_token";
const CSRF_HEADER: &str = "x-csrf-token";

fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
            let pair = pair.trim();
            let (k, v) = pair.split_once('=')?;
            (k == name).then_some(v)
    })
}

fn cookies(parts: &Parts) -> Vec<&str> {
    parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .into_iter()
        .collect()
}

/// A validated, TOTP-verified session extracted from the `session_token`
/// cookie. Sliding expiry happens as a side effect of extraction, mirroring
/// [`rfctl_auth::AuthGateway::validate_session`].
pub struct AuthSession {
    pub session: Session,
    pub user: User,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookie_header = cookies(parts);
        let token = cookie_header
        .iter().find_map(|h| cookie_value(h, SESSION_COOKIE))
        .ok_or(ApiError::AuthMissing)?;

        let session = state.auth.validate_session(token).await?;
        let user = state
        .store
        .get_user(&session.username)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::AuthMissing)?;

        Ok(Self { session, user })
    }
}

/// Accepts either a session cookie or a runner bearer token, for endpoints
/// the access matrix marks "session or runner-auth". Tries [`AuthSession`]
/// first since it is the cheaper header check.
pub enum SessionOrAgentAuth {
    Session(AuthSession),
    Agent(agent::AgentAuth),
}

impl FromRequestParts<AppState> for SessionOrAgentAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if cookies(parts).iter().any(|h| cookie_value(h, SESSION_COOKIE).is_some()) {
            return AuthSession::from_request_parts(parts, state).await.map(Self::Session);
        }
        agent::AgentAuth::from_request_parts(parts, state).await.map(Self::Agent)
    }
}

/// Enforces the double-submit CSRF check for any mutating request
/// that also carries an `AuthSession` (safe methods and agent/public routes
/// never run this layer).
pub async fn enforce_csrf(req: Request, next: Next) -> Result<Response, ApiError> {
    let method = req.method().as_str().to_owned();
    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let cookie_token = req
        .headers()
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| cookie_value(h, CSRF_COOKIE))
        .map(str::to_owned);

    rfctl_auth::csrf::verify(&method, header_token.as_deref(), cookie_token.as_deref())?;
    Ok(next.run(req).await)
}

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError::Validation(msg.into())
}
