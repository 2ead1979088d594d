//! User administration ("Users (admin)"): account CRUD, admin-driven
//! credential resets, and permission grants/revocations.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use rfctl_model::{Permission, SystemStateKey, User};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub enabled: bool,
    pub is_temporary: bool,
    pub has_totp: bool,
    pub permissions: Vec<Permission>,
    pub last_login: Option<chrono::DateTime<Utc>>,
}

impl From<User> for UserSummary {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            enabled: u.enabled,
            is_temporary: u.is_temporary,
            has_totp: u.has_totp(),
            permissions: u.permissions,
            last_login: u.last_login,
        }
    }
}

pub async fn list(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    let users: Vec<UserSummary> = state.store.list_users().await?.into_iter().map(UserSummary::from).collect();
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    /// Required (and used verbatim) only for the initial-setup call;
    /// ignored otherwise in favor of a generated one-time password.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Creates a temporary user with a generated one-time password, mirroring
/// the account-creation half of the setup flow: the admin hands the
/// generated password to the new user out of band, who then completes
/// password+TOTP setup themselves on first login.
///
/// While `initial_setup_required` is still set, the *first* call instead
/// bypasses the permission check entirely and mints the first real admin
/// (see [`complete_initial_setup`]).
pub async fn create(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.get_bool_state(SystemStateKey::InitialSetupRequired).await? {
        return complete_initial_setup(&state, req).await;
    }

    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;

    let temporary_password = rfctl_crypto::generate_session_token();
    let password_hash = rfctl_crypto::hash_password(&temporary_password)
    .map_err(|e| ApiError::Internal(Box::new(e)))?;

    let user = User {
        username: req.username,
        password_hash,
        totp_secret_encrypted: None,
        enabled: true,
        is_temporary: true,
        password_change_required: false,
        permissions: req.permissions,
        created_at: Utc::now(),
        last_login: None,
    };
    state.store.create_user(&user).await?;

    Ok(Json(serde_json::json!({
                    "username": user.username,
                    "temporary_password": temporary_password,
    })))
}

/// Fresh-install path: no permission check (there is no admin yet to hold
/// one), a full non-temporary account with TOTP already configured instead
/// of the usual temporary/setup-required one, both permissions granted
/// outright, and the bootstrap account disabled once the real admin exists.
async fn complete_initial_setup(
    state: &AppState,
    req: CreateUserRequest,
) -> Result<Json<serde_json::Value>, ApiError> {
    let password = req.password.ok_or_else(|| ApiError::Validation("missing password".to_owned()))?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    let password_hash = rfctl_crypto::hash_password(&password).map_err(|e| ApiError::Internal(Box::new(e)))?;

    let totp_secret = rfctl_crypto::generate_totp_secret();
    let totp_secret_encrypted = state
    .vault
    .encrypt_totp(&totp_secret)
    .map_err(|e| ApiError::Internal(Box::new(e)))?;

    let user = User {
        username: req.username.clone(),
        password_hash,
        totp_secret_encrypted: Some(totp_secret_encrypted),
        enabled: true,
        is_temporary: false,
        password_change_required: false,
        permissions: vec![Permission::CreateUsers, Permission::CreateProvisioningKey],
        created_at: Utc::now(),
        last_login: None,
    };
    state.store.create_user(&user).await?;

    if let Some(mut bootstrap) = state.store.get_user(rfctl_store::BOOTSTRAP_USERNAME).await? {
        bootstrap.enabled = false;
        state.store.update_user(&bootstrap).await?;
    }
    state.store.set_bool_state(SystemStateKey::InitialSetupRequired, false).await?;

    let provisioning_uri =
    rfctl_auth::totp_provisioning_uri(&state.config.auth.totp_issuer, &req.username, &totp_secret);

    Ok(Json(serde_json::json!({
                    "username": req.username,
                    "totp_secret": totp_secret,
                    "provisioning_uri": provisioning_uri,
                    "is_temporary": false,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(username): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    let mut user = state.store.get_user(&username).await?.ok_or(ApiError::NotFound("user"))?;
    if let Some(enabled) = req.enabled {
        user.enabled = enabled;
    }
    state.store.update_user(&user).await?;
    Ok(Json(UserSummary::from(user)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    state.store.delete_user(&username).await?;
    Ok(Json(serde_json::json!({"deleted": username})))
}

pub async fn reset_totp(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    let mut user = state.store.get_user(&username).await?.ok_or(ApiError::NotFound("user"))?;
    user.totp_secret_encrypted = None;
    state.store.update_user(&user).await?;
    Ok(Json(serde_json::json!({"username": username, "totp_reset": true})))
}

pub async fn reset_password(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let new_password = state.auth.admin_reset_password(&auth.user.username, &username).await?;
    Ok(Json(serde_json::json!({"username": username, "temporary_password": new_password})))
}

pub async fn get_permissions(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.store.get_user(&username).await?.ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.permissions))
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission: Permission,
}

pub async fn grant_permission(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(username): Path<String>,
    Json(req): Json<GrantPermissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    rfctl_auth::AuthGateway::refuse_self_permission_change(&auth.user.username, &username)?;
    let mut user = state.store.get_user(&username).await?.ok_or(ApiError::NotFound("user"))?;
    if !user.permissions.contains(&req.permission) {
        user.permissions.push(req.permission);
    }
    state.store.update_user(&user).await?;
    Ok(Json(user.permissions))
}

pub async fn revoke_permission(
    State(state): State<AppState>,
    auth: AuthSession,
    Path((username, permission)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    rfctl_auth::AuthGateway::require_permission(&auth.user, Permission::CreateUsers)?;
    rfctl_auth::AuthGateway::refuse_self_permission_change(&auth.user.username, &username)?;
    let permission = Permission::from_str_loose(&permission)
    .ok_or_else(|| ApiError::Validation(format!("unknown permission: {permission}")))?;
    let mut user = state.store.get_user(&username).await?.ok_or(ApiError::NotFound("user"))?;
    user.permissions.retain(|p| *p != permission);
    state.store.update_user(&user).await?;
    Ok(Json(user.permissions))
}
