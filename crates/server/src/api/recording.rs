//! Listener-facing recording endpoints ("Recording"): the
//! start/complete/upload trio a listener runs once it has acted on a
//! `recording_assignment` pushed over its `/agents` socket.

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use rfctl_eventbus::Event;
use rfctl_model::{FileRecord, Recording, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};

use crate::auth::agent::AgentAuth;
use crate::error::ApiError;
use crate::state::AppState;

fn require_self(auth: &AgentAuth, agent_id: &str) -> Result<(), ApiError> {
    if auth.agent_id != agent_id {
        return Err(ApiError::AuthInvalid);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    pub assignment_id: String,
    pub challenge_id: String,
    pub transmission_id: String,
    pub frequency_hz: u64,
    pub sample_rate: u32,
    pub expected_duration_s: f64,
}

/// `POST /agents/{id}/recording/start`: the listener echoes back the
/// assignment's placeholder transmission id, which by this point names a
/// real row (`GET /agents/{id}/task` already created it).
pub async fn start(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(agent_id): Path<String>,
    Json(req): Json<StartRecordingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    let recording = Recording {
        id: req.assignment_id,
        challenge_id: req.challenge_id,
        transmission_id: req.transmission_id,
        listener_id: agent_id.clone(),
        frequency_hz: req.frequency_hz,
        sample_rate: req.sample_rate,
        expected_duration_s: req.expected_duration_s,
        started_at: Utc::now(),
        completed_at: None,
        success: None,
        image_path: None,
        image_width: None,
        image_height: None,
        error_message: None,
    };
    state.store.create_recording(&recording).await?;
    state
    .eventbus
    .publish_admin(Event::RecordingStarted {
            recording_id: recording.id.clone(),
            listener_id: agent_id,
            timestamp: Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"recording_id": recording.id})))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRecordingRequest {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn complete(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path((agent_id, recording_id)): Path<(String, String)>,
    Json(req): Json<CompleteRecordingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    state
    .store
    .complete_recording(&recording_id, req.success, None, None, None, req.error.as_deref())
    .await?;
    state
    .eventbus
    .publish_admin(Event::RecordingComplete {
            recording_id: recording_id.clone(),
            success: req.success,
            timestamp: Utc::now(),
    })
    .await;
    Ok(Json(serde_json::json!({"status": "recorded"})))
}

/// `POST /agents/{id}/recording/{rid}/upload` (multipart PNG): stores the
/// waterfall image content-addressed by sha256 (File, "a file
/// directory whose names are sha256 hashes"), then records its path and
/// dimensions against the recording row, preserving whatever
/// success/error `complete` already recorded.
pub async fn upload(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path((agent_id, recording_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    require_self(&auth, &agent_id)?;
    let recording = state
    .store
    .get_recording(&recording_id)
    .await?
    .ok_or(ApiError::NotFound("recording"))?;

    let mut image_bytes = None;
    while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        if field.name() == Some("image") {
            image_bytes = Some(field.bytes().await.map_err(|e| ApiError::Validation(e.to_string()))?);
        }
    }
    let bytes = image_bytes.ok_or_else(|| ApiError::Validation("missing image field".to_owned()))?;
    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }
    if !ALLOWED_EXTENSIONS.contains(&"png") {
        return Err(ApiError::Internal(Box::new(std::io::Error::other("png extension not whitelisted"))));
    }

    let (width, height) =
    png_dimensions(&bytes).ok_or_else(|| ApiError::Validation("not a valid PNG image".to_owned()))?;

    let hash = hex::encode(Sha256::digest(&bytes));
    let dir = &state.config.store.file_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| ApiError::Internal(Box::new(e)))?;
    let path = format!("{dir}/{hash}");
    tokio::fs::write(&path, &bytes).await.map_err(|e| ApiError::Internal(Box::new(e)))?;

    state
    .store
    .put_file(&FileRecord {
            file_hash: hash.clone(),
            filename: format!("{recording_id}.png"),
            size: bytes.len() as u64,
            mime_type: "image/png".to_owned(),
            path: path.clone(),
            created_at: Utc::now(),
    })
    .await?;

    state
    .store
    .complete_recording(
        &recording_id,
        recording.success.unwrap_or(true),
        Some(&path),
        Some(width),
        Some(height),
        recording.error_message.as_deref(),
    )
    .await?;

    Ok(Json(serde_json::json!({"status": "uploaded", "file_hash": hash})))
}

/// Reads width/height out of a PNG's `IHDR` chunk without decoding pixels:
/// signature (8 bytes) + length (4) + `"IHDR"` (4) + width (4) + height (4).
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if bytes.len() < 24 || bytes[0..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bytes_with_no_png_signature() {
        assert!(png_dimensions(b"not a png").is_none());
    }

    #[test]
    fn reads_width_and_height_from_ihdr() {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0, 0, 0, 13]); // chunk length
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&800u32.to_be_bytes());
        bytes.extend_from_slice(&600u32.to_be_bytes());
        assert_eq!(png_dimensions(&bytes), Some((800, 600)));
    }
}
