//! Enrollment endpoints ("Enrollment"): admin-issued one-shot
//! tokens, the token-authenticated runner `enroll` call, and re-enrollment.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use rfctl_eventbus::Event;
use rfctl_model::{Device, Permission};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub runner_name: String,
    #[serde(default)]
    pub expires_hours: Option<i64>,
}

pub async fn create_token(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(req): Json<CreateTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    let token = state
    .enrollment
    .create_enrollment_token(&req.runner_name, &auth.user.username, req.expires_hours)
    .await?;
    Ok(Json(token))
}

pub async fn list_tokens(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.enrollment.list_enrollment_tokens().await?))
}

pub async fn delete_token(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    state.enrollment.delete_enrollment_token(&token).await?;
    Ok(Json(serde_json::json!({"status": "deleted"})))
}

#[derive(Debug, Deserialize)]
pub struct ReEnrollRequest {
    #[serde(default)]
    pub expires_hours: Option<i64>,
}

pub async fn re_enroll(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(runner_id): Path<String>,
    Json(req): Json<ReEnrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    let reenrollment = state
    .enrollment
    .re_enroll(&runner_id, &auth.user.username, req.expires_hours)
    .await?;
    Ok(Json(serde_json::json!({
                    "token": reenrollment.token,
                    "suggested_api_key": reenrollment.suggested_api_key,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequestBody {
    pub enrollment_token: String,
    pub api_key: String,
    pub runner_id: String,
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// `POST /enrollment/enroll`: token-authenticated, not session-authenticated
/// — the runner doesn't have an admin session, only the one-shot token and
/// its own freshly generated API key.
pub async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let enrolled = state
    .enrollment
    .enroll(rfctl_enrollment::EnrollRequest {
            enrollment_token: &req.enrollment_token,
            api_key: &req.api_key,
            runner_id: &req.runner_id,
            hostname: &req.hostname,
            ip: &req.ip,
            mac: req.mac.as_deref(),
            machine_id: req.machine_id.as_deref(),
            devices: &req.devices,
    })
    .await?;

    state
    .eventbus
    .publish_admin(Event::RunnerEnrolled {
            agent_id: enrolled.runner_id.clone(),
            timestamp: chrono::Utc::now(),
    })
    .await;

    Ok(Json(serde_json::json!({
                    "runner_id": enrolled.runner_id,
                    "runner_name": enrolled.runner_name,
    })))
}
