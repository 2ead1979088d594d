//! Content-addressed file storage (File, "Files"): flag bundles and
//! other challenge assets, fetched by runners and uploaded by admins.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sha2::{Digest, Sha256};

use rfctl_model::{FileRecord, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};

use crate::auth::agent::AgentAuth;
use crate::auth::SessionOrAgentAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /files/{sha256}` (runner-auth): runners fetch flag bundles and
/// other challenge assets named by content hash, never by filename.
pub async fn download(
    State(state): State<AppState>,
    _auth: AgentAuth,
    Path(file_hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state.store.get_file(&file_hash).await?.ok_or(ApiError::NotFound("file"))?;
    let bytes = tokio::fs::read(&file.path).await.map_err(|e| ApiError::Internal(Box::new(e)))?;
    Ok((
            [(axum::http::header::CONTENT_TYPE, file.mime_type)],
            bytes,
    ))
}

/// `POST /files/upload` (session or runner-auth): admins attach assets to
/// challenges ahead of referencing their hash from a `ChallengeConfig`;
/// runners may also push assets they generated (e.g. recordings) directly.
pub async fn upload(
    State(state): State<AppState>,
    _auth: SessionOrAgentAuth,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut filename = None;
    let mut bytes: Option<Bytes> = None;
    while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_owned);
            bytes = Some(field.bytes().await.map_err(|e| ApiError::Validation(e.to_string()))?);
        }
    }
    let bytes = bytes.ok_or_else(|| ApiError::Validation("missing file field".to_owned()))?;
    let filename = filename.ok_or_else(|| ApiError::Validation("missing filename".to_owned()))?;

    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }
    let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::Validation(format!("extension.{extension} is not allowed")));
    }

    let hash = hex::encode(Sha256::digest(&bytes));
    let dir = &state.config.store.file_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| ApiError::Internal(Box::new(e)))?;
    let path = format!("{dir}/{hash}");
    tokio::fs::write(&path, &bytes).await.map_err(|e| ApiError::Internal(Box::new(e)))?;

    let mime_type = mime_guess_from_extension(&extension);
    state
    .store
    .put_file(&FileRecord {
            file_hash: hash.clone(),
            filename,
            size: bytes.len() as u64,
            mime_type: mime_type.to_owned(),
            path,
            created_at: Utc::now(),
    })
    .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"file_hash": hash}))))
}

fn mime_guess_from_extension(extension: &str) -> &'static str {
    match extension {
        "txt" | "yml" | "yaml" | "py" | "grc" => "text/plain",
        "wav" => "audio/wav",
        "bin" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}
