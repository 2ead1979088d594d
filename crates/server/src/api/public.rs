//! Unauthenticated endpoints ("Public"): health, the public challenge
//! board, conference metadata, and the named frequency ranges.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn challenges(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let views: Vec<_> = state
    .store
    .list_challenges().await?
    .into_iter().map(|c| c.to_public_view())
    .collect();
    Ok(Json(views))
}

#[derive(Debug, Serialize)]
pub struct ConferenceResponse {
    pub name: String,
    pub message: String,
}

pub async fn conference(State(state): State<AppState>) -> impl IntoResponse {
    Json(ConferenceResponse {
            name: state.config.conference.name.clone(),
            message: state.config.conference.message.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct FrequencyRange {
    pub name: String,
    pub min_hz: u64,
    pub max_hz: u64,
}

pub async fn frequency_ranges(State(state): State<AppState>) -> impl IntoResponse {
    let ranges: Vec<FrequencyRange> = state
    .config
    .frequency_ranges
    .iter().map(|(name, r)| FrequencyRange { name: name.clone(), min_hz: r.min_hz, max_hz: r.max_hz })
    .collect();
    Json(ranges)
}
