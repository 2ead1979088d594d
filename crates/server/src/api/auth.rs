//! Login, TOTP verification, session introspection, and the temporary-user
//! setup flow ("Auth").

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use rfctl_auth::cookies::SESSION_LIFETIME_HOURS;
use rfctl_auth::{CookiePolicy, LoginStatus};

use crate::auth::{AuthSession, CSRF_COOKIE, SESSION_COOKIE};
use crate::error::ApiError;
use crate::ratelimit::addr_from_parts;
use crate::state::AppState;

fn client_ip(headers: &HeaderMap, connect: Option<SocketAddr>) -> String {
    addr_from_parts(headers, connect)
}

fn user_agent(headers: &HeaderMap) -> String {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("").to_owned()
}

fn cookie_policy(headers: &HeaderMap) -> CookiePolicy {
    let forwarded_proto = headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok());
    CookiePolicy::detect(false, forwarded_proto)
}

fn set_cookie(response: &mut Response, name: &str, value: &str, attrs: &str) {
    let header_value = format!("{name}={value}; Max-Age={}; {attrs}", SESSION_LIFETIME_HOURS * 3600);
    if let Ok(v) = HeaderValue::from_str(&header_value) {
        response.headers_mut().append(header::SET_COOKIE, v);
    }
}

fn clear_cookie(response: &mut Response, name: &str, attrs: &str) {
    let header_value = format!("{name}=; Max-Age=0; {attrs}");
    if let Ok(v) = HeaderValue::from_str(&header_value) {
        response.headers_mut().append(header::SET_COOKIE, v);
    }
}

fn auth_cookies(response: &mut Response, headers: &HeaderMap, session_token: &str, csrf_token: &str) {
    let policy = cookie_policy(headers);
    set_cookie(response, SESSION_COOKIE, session_token, policy.session_cookie_attrs());
    set_cookie(response, CSRF_COOKIE, csrf_token, policy.csrf_cookie_attrs());
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LoginResponseBody {
    Authenticated { initial_setup_required: bool },
    TotpRequired,
    SetupRequired,
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(connect): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, Some(connect));
    let ua = user_agent(&headers);
    let result = state.auth.login(&ip, &ua, &req.username, &req.password).await?;

    let body = match result.status {
        LoginStatus::Authenticated { initial_setup_required } => {
            LoginResponseBody::Authenticated { initial_setup_required }
        }
        LoginStatus::TotpRequired => LoginResponseBody::TotpRequired,
        LoginStatus::SetupRequired => LoginResponseBody::SetupRequired,
    };

    let mut response = Json(body).into_response();
    auth_cookies(&mut response, &headers, &result.session_token, &result.csrf_token);
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct VerifyTotpRequest {
    pub totp_code: String,
}

pub async fn verify_totp(
    State(state): State<AppState>,
    ConnectInfo(connect): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<VerifyTotpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, Some(connect));
    let ua = user_agent(&headers);
    let token = session_cookie(&headers).ok_or(ApiError::AuthMissing)?;
    let verified = state.auth.verify_totp(&ip, &ua, &token, &req.totp_code).await?;
    Ok(Json(serde_json::json!({
                    "status": "authenticated",
                    "username": verified.username,
                    "password_change_required": verified.password_change_required,
    })))
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
    .get(header::COOKIE)
    .and_then(|v| v.to_str().ok())?
    .split(';')
    .find_map(|pair| {
            let pair = pair.trim();
            let (k, v) = pair.split_once('=')?;
            (k == SESSION_COOKIE).then(|| v.to_owned())
    })
}

pub async fn session(auth: AuthSession) -> impl IntoResponse {
    Json(serde_json::json!({
                "authenticated": true,
                "username": auth.user.username,
                "permissions": auth.user.permissions,
                "password_change_required": auth.user.password_change_required,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_cookie(&headers) {
        state.auth.logout(&token).await?;
    }
    let mut response = Json(serde_json::json!({"status": "logged_out"})).into_response();
    let policy = cookie_policy(&headers);
    clear_cookie(&mut response, SESSION_COOKIE, policy.session_cookie_attrs());
    clear_cookie(&mut response, CSRF_COOKIE, policy.csrf_cookie_attrs());
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: AuthSession,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_cookie(&headers).ok_or(ApiError::AuthMissing)?;
    let invalidated = state
    .auth
    .change_password(&token, &auth.user.username, &req.current_password, &req.new_password)
    .await?;
    Ok(Json(serde_json::json!({"status": "changed", "sessions_invalidated": invalidated})))
}

#[derive(Debug, Deserialize)]
pub struct CompleteSetupRequest {
    pub new_password: String,
}

pub async fn complete_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteSetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_cookie(&headers).ok_or(ApiError::AuthMissing)?;
    let issuer = &state.config.auth.totp_issuer;
    let step = state.auth.complete_setup(&token, issuer, &req.new_password).await?;
    Ok(Json(serde_json::json!({
                    "totp_secret": step.totp_secret,
                    "provisioning_uri": step.provisioning_uri,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifySetupRequest {
    pub totp_code: String,
}

pub async fn verify_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifySetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_cookie(&headers).ok_or(ApiError::AuthMissing)?;
    state.auth.verify_setup(&token, &req.totp_code).await?;
    Ok(Json(serde_json::json!({"status": "setup_complete"})))
}
