//! Operator dashboard and control endpoints ("Admin"): read-only
//! fleet views plus the scheduler pause/resume/trigger controls and the
//! conference-settings editor.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use rfctl_eventbus::Event;
use rfctl_model::{Agent, SystemStateKey};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn runners(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    let agents: Vec<Agent> = state.store.list_agents().await?;
    Ok(Json(agents))
}

pub async fn transmissions(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    let transmissions = state.store.list_transmissions(100).await?;
    Ok(Json(transmissions))
}

/// `GET /admin/recordings`: flattens the recordings attached to the most
/// recent transmissions, since the store indexes recordings per
/// transmission rather than in one global table.
pub async fn recordings(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    let transmissions = state.store.list_transmissions(100).await?;
    let mut recordings = Vec::new();
    for tx in &transmissions {
        recordings.extend(state.store.list_recordings_for_transmission(&tx.id).await?);
    }
    Ok(Json(recordings))
}

pub async fn logs(State(state): State<AppState>, _auth: AuthSession) -> impl IntoResponse {
    Json(state.eventbus.recent_logs().await)
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub runner_count: usize,
    pub listener_count: usize,
    pub online_count: usize,
    pub recent_transmissions: usize,
}

pub async fn dashboard(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    let agents = state.store.list_agents().await?;
    let recent = state.store.list_transmissions(50).await?;
    Ok(Json(DashboardSummary {
                runner_count: agents.iter().filter(|a| a.agent_type == rfctl_model::AgentType::Runner).count(),
                listener_count: agents.iter().filter(|a| a.agent_type == rfctl_model::AgentType::Listener).count(),
                online_count: agents.iter().filter(|a| a.status == rfctl_model::AgentStatus::Online).count(),
                recent_transmissions: recent.len(),
    }))
}

pub async fn security_log(State(state): State<AppState>, _auth: AuthSession) -> impl IntoResponse {
    Json(state.auth.security_log.recent().await)
}

pub async fn pause(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.pause().await?;
    state
    .eventbus
    .publish_admin(Event::SystemControl {
            action: "pause".to_owned(),
            by_username: auth.user.username,
            timestamp: chrono::Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"status": "paused"})))
}

pub async fn resume(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.resume().await?;
    state
    .eventbus
    .publish_admin(Event::SystemControl {
            action: "resume".to_owned(),
            by_username: auth.user.username,
            timestamp: chrono::Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"status": "resumed"})))
}

pub async fn status(State(state): State<AppState>, _auth: AuthSession) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.status().await?))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub challenge_id: String,
}

pub async fn trigger(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(req): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.trigger_challenge_now(&req.challenge_id).await?;
    state
    .eventbus
    .publish_admin(Event::SystemControl {
            action: format!("trigger:{}", req.challenge_id),
            by_username: auth.user.username,
            timestamp: chrono::Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"status": "triggered"})))
}

#[derive(Debug, Deserialize)]
pub struct AutoPauseSettings {
    pub auto_pause_daily: bool,
    pub day_start: String,
    pub end_of_day: String,
}

pub async fn set_auto_pause(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(req): Json<AutoPauseSettings>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.scheduler.store();
    store.set_bool_state(SystemStateKey::AutoPauseDaily, req.auto_pause_daily).await?;
    store.set_state(SystemStateKey::DayStart, &req.day_start).await?;
    store.set_state(SystemStateKey::EndOfDay, &req.end_of_day).await?;
    Ok(Json(serde_json::json!({"status": "updated"})))
}
