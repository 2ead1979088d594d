//! Provisioning-key administration and the stateless `provision` endpoint
//! ("Provisioning"): long-lived keys that mint fresh runner
//! credentials without any session of their own.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use rfctl_enrollment::{ProvisionDevice, ProvisionRequest};
use rfctl_model::Permission;

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub key_id: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_key(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(req): Json<CreateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateProvisioningKey)?;
    let (key, api_key) = state
    .enrollment
    .create_provisioning_key(&req.key_id, &req.description, &auth.user.username)
    .await?;
    Ok(Json(serde_json::json!({"key": key, "api_key": api_key})))
}

pub async fn list_keys(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.enrollment.list_provisioning_keys().await?))
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_enabled(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(key_id): Path<String>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateProvisioningKey)?;
    state.enrollment.set_provisioning_key_enabled(&key_id, req.enabled).await?;
    Ok(Json(serde_json::json!({"status": "updated"})))
}

pub async fn delete_key(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(key_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateProvisioningKey)?;
    state.enrollment.delete_provisioning_key(&key_id).await?;
    Ok(Json(serde_json::json!({"status": "deleted"})))
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequestBody {
    pub provisioning_key: String,
    pub runner_name: String,
    #[serde(default)]
    pub runner_id: Option<String>,
    #[serde(default)]
    pub expires_hours: Option<i64>,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default)]
    pub devices: Vec<ProvisionDevice>,
}

/// `POST /provisioning/provision` ("stateless; no CSRF"): the caller
/// authenticates with the provisioning key itself in the body, not a
/// session or a bearer header, since the credential it mints has to be
/// handed to a runner that has no session of its own yet either.
pub async fn provision(
    State(state): State<AppState>,
    Json(req): Json<ProvisionRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let provisioned = state
    .enrollment
    .provision(
        &req.provisioning_key,
        ProvisionRequest {
            runner_name: req.runner_name,
            runner_id: req.runner_id,
            expires_hours: req.expires_hours,
            server_url: req.server_url,
            verify_ssl: req.verify_ssl,
            devices: req.devices,
        },
    )
    .await?;
    Ok(Json(serde_json::json!({
                    "runner_name": provisioned.runner_name,
                    "runner_id": provisioned.runner_id,
                    "enrollment_token": provisioned.enrollment_token,
                    "api_key": provisioned.api_key,
                    "expires_utc": provisioned.expires_utc,
                    "config_yaml": provisioned.config_yaml,
    })))
}
