//! Agent-facing endpoints: registration, heartbeat, signout, log
//! forwarding, and task polling/completion for runners.
//!
//! Every handler is bearer-authenticated via `AgentAuth`, which resolves
//! `agent_id` from the presented API key rather than trusting the path
//! parameter, so `require_self` only guards against a caller quoting a
//! different agent's id in the URL than the one its key actually binds to.
//!
//! Registration serves both runners and listeners behind one handler: an
//! agent already holds a bearer token from enrollment, so `register` here
//! is just the update-semantics re-registration path (refreshed
//! hostname/ip/devices), never the initial credential mint (that's
//! `EnrollmentService::enroll`).

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use rfctl_eventbus::Event;
use rfctl_model::{AgentStatus, AgentType, ChallengeConfig, Device, Transmission, TransmissionStatus};
use rfctl_store::StoreError;

use crate::auth::agent::AgentAuth;
use crate::error::ApiError;
use crate::state::AppState;

fn require_self(auth: &AgentAuth, agent_id: &str) -> Result<(), ApiError> {
    if auth.agent_id != agent_id {
        return Err(ApiError::AuthInvalid);
    }
    Ok(())
}

async fn publish_status_change(state: &AppState, agent_id: &str, status: AgentStatus) -> Result<(), ApiError> {
    let agent = state.store.get_agent(agent_id).await?.ok_or(ApiError::NotFound("agent"))?;
    let timestamp = Utc::now();
    let event = match agent.agent_type {
        AgentType::Runner => Event::RunnerStatus { agent_id: agent_id.to_owned(), status, timestamp },
        AgentType::Listener => Event::ListenerStatus { agent_id: agent_id.to_owned(), status, timestamp },
    };
    state.eventbus.publish_admin(event).await;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

pub async fn register(
    State(state): State<AppState>,
    auth: AgentAuth,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state.store.get_agent(&auth.agent_id).await?.ok_or(ApiError::NotFound("agent"))?;
    state
    .registry
    .register(
        &auth.agent_id,
        existing.agent_type,
        &req.hostname,
        &req.ip,
        req.mac.as_deref(),
        req.machine_id.as_deref(),
        &req.devices,
        None,
    )
    .await?;
    Ok(Json(serde_json::json!({"agent_id": auth.agent_id, "status": "registered"})))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    let previous = state.registry.heartbeat(&agent_id).await?;
    if previous == Some(AgentStatus::Offline) {
        publish_status_change(&state, &agent_id, AgentStatus::Online).await?;
    }
    Ok(Json(serde_json::json!({"status": "ok"})))
}

pub async fn signout(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    state.registry.mark_offline(&agent_id).await?;
    publish_status_change(&state, &agent_id, AgentStatus::Offline).await?;
    Ok(Json(serde_json::json!({"status": "offline"})))
}

#[derive(Debug, Deserialize)]
pub struct LogRequest {
    #[serde(default = "default_level")]
    pub level: String,
    pub message: String,
}

fn default_level() -> String {
    "info".to_owned()
}

pub async fn log(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
    Json(req): Json<LogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    state
    .eventbus
    .publish_admin(Event::Log {
            level: req.level,
            message: format!("[{agent_id}] {}", req.message),
            timestamp: Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"status": "logged"})))
}

#[derive(Debug, Serialize)]
pub struct TaskBody {
    pub challenge_id: String,
    pub name: String,
    pub config: ChallengeConfig,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Option<TaskBody>,
}

/// `GET /agents/{id}/task` (runner-only, S1/S2): assigns the next ready
/// challenge, resolves its per-call frequency and an opportunistic listener,
/// opens the transmission row, and pushes the recording assignment to the
/// listener's `/agents` socket if one was selected.
pub async fn task(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    let agent = state.store.get_agent(&agent_id).await?.ok_or(ApiError::NotFound("agent"))?;
    if agent.agent_type != AgentType::Runner {
        return Err(ApiError::Validation("only runners poll for tasks".to_owned()));
    }

    let challenge = match state.scheduler.assign_next_challenge(&agent_id).await {
        Ok(challenge) => challenge,
        Err(StoreError::NoneAvailable) => return Ok(Json(TaskResponse { task: None })),
        Err(e) => return Err(e.into()),
    };

    let listeners = state.store.list_agents_by_type(AgentType::Listener).await?;
    let resolution = state.assignment.resolve(&challenge, &state.named_ranges, &listeners)?;

    let transmission_id = resolution
    .recording_assignment
    .as_ref().map(|(_, ra)| ra.transmission_id_placeholder.clone())
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state
    .store
    .create_transmission(&Transmission {
            id: transmission_id,
            challenge_id: challenge.challenge_id.clone(),
            runner_id: agent_id.clone(),
            device_id: None,
            frequency_hz: resolution.frequency_hz,
            started_at: Utc::now(),
            completed_at: None,
            status: TransmissionStatus::Transmitting,
            error_message: None,
    })
    .await?;

    if let Some((listener_id, assignment)) = &resolution.recording_assignment {
        state
        .connections
        .push(
            listener_id,
            Event::RecordingAssignment {
                assignment_id: assignment.assignment_id.clone(),
                challenge_id: assignment.challenge_id.clone(),
                transmission_id_placeholder: assignment.transmission_id_placeholder.clone(),
                frequency_hz: assignment.frequency_hz,
                expected_start: assignment.expected_start,
                expected_duration_s: assignment.expected_duration_s,
            },
        )
        .await;
    }

    state
    .eventbus
    .publish_admin(Event::ChallengeAssigned {
            challenge_id: challenge.challenge_id.clone(),
            runner_id: agent_id,
            timestamp: Utc::now(),
    })
    .await;

    Ok(Json(TaskResponse {
                task: Some(TaskBody {
                        challenge_id: challenge.challenge_id,
                        name: challenge.name,
                        config: resolution.runner_config,
                }),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub challenge_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /agents/{id}/complete`: `complete_challenge` returning `None`
/// means the row was already back to `waiting`, so a duplicate call
/// acknowledges without touching the transmission history a second time.
pub async fn complete(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    let config = state
    .store
    .complete_challenge(&req.challenge_id, &agent_id, req.success, req.error.as_deref())
    .await?;
    if config.is_none() {
        state
        .eventbus
        .publish_admin(Event::Log {
                level: "info".to_owned(),
                message: format!(
                    "[{agent_id}] duplicate complete for challenge {} ignored, no new transmission recorded",
                    req.challenge_id
                ),
                timestamp: Utc::now(),
        })
        .await;
        return Ok(Json(serde_json::json!({"status": "recorded"})));
    }

    let transmissions = state.store.list_transmissions_for_challenge(&req.challenge_id).await?;
    if let Some(open) = transmissions
    .into_iter().find(|t| t.runner_id == agent_id && t.status == TransmissionStatus::Transmitting)
    {
        state.store.complete_transmission(&open.id, req.success, req.error.as_deref()).await?;
        state
        .eventbus
        .publish_admin(Event::TransmissionComplete {
                transmission_id: open.id,
                challenge_id: req.challenge_id,
                runner_id: agent_id,
                success: req.success,
                timestamp: Utc::now(),
        })
        .await;
    }

    Ok(Json(serde_json::json!({"status": "recorded"})))
}
