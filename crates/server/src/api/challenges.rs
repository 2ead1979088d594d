//! Challenge CRUD and bulk import ("Challenges").
//!
//! `POST /challenges/import` accepts either a YAML body (the config
//! document's own `[[challenges]]` shape) or, when the request carries
//! `Content-Type: text/csv`, the flat spreadsheet format the conference
//! organizers actually author challenges in.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthSession;
use crate::config::{ChallengeSeed, Config};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub challenge_id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChallengeRequest {
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub config: Value,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
}

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    let challenges = state.store.list_challenges().await?;
    Ok(Json(challenges))
}

pub async fn get(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(challenge_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let challenge = state
    .store
    .get_challenge(&challenge_id)
    .await?
    .ok_or(ApiError::NotFound("challenge"))?;
    Ok(Json(challenge))
}

pub async fn create(
    State(state): State<AppState>,
    _auth: AuthSession,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = parse_config(req.config)?;
    state
    .store
    .create_challenge(&req.challenge_id, &req.name, &config, req.priority)
    .await?;
    Ok(Json(serde_json::json!({"challenge_id": req.challenge_id})))
}

pub async fn update(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(challenge_id): Path<String>,
    Json(req): Json<UpdateChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = parse_config(req.config)?;
    state
    .store
    .update_challenge_config(&challenge_id, &config, req.priority)
    .await?;
    Ok(Json(serde_json::json!({"challenge_id": challenge_id})))
}

pub async fn delete(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(challenge_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_challenge(&challenge_id).await?;
    Ok(Json(serde_json::json!({"deleted": challenge_id})))
}

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    pub enabled: bool,
}

pub async fn enable(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(challenge_id): Path<String>,
    Json(req): Json<EnableRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.set_challenge_enabled(&challenge_id, req.enabled).await?;
    Ok(Json(serde_json::json!({"challenge_id": challenge_id, "enabled": req.enabled})))
}

pub async fn trigger(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(challenge_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.trigger_challenge_now(&challenge_id).await?;
    Ok(Json(serde_json::json!({"challenge_id": challenge_id, "status": "queued"})))
}

/// Re-reads the on-disk config document and upserts its `[[challenges]]`
/// entries, leaving any challenge not named there untouched.
pub async fn reload(
    State(state): State<AppState>,
    _auth: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    let config = Config::load(&state.config_path)
    .map_err(|e| ApiError::Validation(e.to_string()))?;
    let summary = upsert_seeds(&state, config.challenges).await?;
    Ok(Json(summary))
}

pub async fn import(
    State(state): State<AppState>,
    _auth: AuthSession,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let is_csv = headers
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.starts_with("text/csv"));
    let text = String::from_utf8(body.to_vec())
    .map_err(|_| ApiError::Validation("body is not valid UTF-8".to_owned()))?;

    let seeds = if is_csv {
        csv::parse_challenges(&text)?
    } else {
        serde_yaml_ng::from_str::<Vec<ChallengeSeed>>(&text)
        .map_err(|e| ApiError::Validation(format!("invalid YAML import: {e}")))?
    };

    let summary = upsert_seeds(&state, seeds).await?;
    Ok(Json(summary))
}

async fn upsert_seeds(state: &AppState, seeds: Vec<ChallengeSeed>) -> Result<ImportSummary, ApiError> {
    let mut imported = 0;
    let mut updated = 0;
    for seed in seeds {
        seed.config.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
        match state
        .store
        .create_challenge(&seed.challenge_id, &seed.name, &seed.config, seed.priority)
        .await
        {
            Ok(()) => imported += 1,
            Err(rfctl_store::StoreError::Conflict(_)) => {
                state
                .store
                .update_challenge_config(&seed.challenge_id, &seed.config, seed.priority)
                .await?;
                updated += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ImportSummary { imported, updated })
}

fn parse_config(raw: Value) -> Result<rfctl_model::ChallengeConfig, ApiError> {
    rfctl_model::ChallengeConfig::check_frequency_exclusivity(&raw)
    .map_err(|e| ApiError::Validation(e.to_string()))?;
    let config: rfctl_model::ChallengeConfig =
    serde_json::from_value(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
    config.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(config)
}

/// The flat spreadsheet import format: one header row of conference
/// metadata (ignored here; conference metadata comes from the static
/// config) followed by one row per challenge. Fields are unquoted and
/// comma-split verbatim.
mod csv {
    use super::ChallengeSeed;
    use crate::error::ApiError;
    use rfctl_model::{ChallengeConfig, FrequencySpec, PublicVisibility};
    use serde_json::{Map, Value};

    const DEFAULT_MIN_DELAY: u64 = 60;
    const DEFAULT_MAX_DELAY: u64 = 90;

    pub fn parse_challenges(body: &str) -> Result<Vec<ChallengeSeed>, ApiError> {
        let mut lines = body.lines().filter(|l| !l.trim().is_empty());
        lines.next(); // conference_name,start_time,end_time — not used here

        lines.map(parse_row).collect()
    }

    fn parse_row(row: &str) -> Result<ChallengeSeed, ApiError> {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");

        let challenge_id = field(0);
        let name = field(1);
        let flag = field(2);
        let modulation = field(3).to_lowercase();
        let modopt1 = field(4);
        let modopt2 = field(5);
        if challenge_id.is_empty() || modulation.is_empty() {
            return Err(ApiError::Validation(format!("malformed CSV row: {row}")));
        }

        let min_delay = parse_or(field(6), DEFAULT_MIN_DELAY);
        let max_delay = parse_or(field(7), DEFAULT_MAX_DELAY);

        let mut extra = Map::new();
        match modulation.as_str() {
            "cw" => insert_u32(&mut extra, "speed", modopt1),
            "nbfm" => insert_u32(&mut extra, "wav_samplerate", modopt1),
            "pocsag" => insert_u32(&mut extra, "capcode", modopt1),
            "ssb" | "freedv" => {
                if matches!(modopt1.to_lowercase().as_str(), "lsb" | "usb") {
                    extra.insert("mode".to_owned(), Value::String(modopt1.to_lowercase()));
                } else {
                    insert_u32(&mut extra, "wav_samplerate", modopt1);
                }
            }
            "fhss" => {
                extra.insert("hop_rate".to_owned(), Value::from(10));
                extra.insert("hop_time".to_owned(), Value::from(60));
                extra.insert("channel_spacing".to_owned(), Value::from(10_000));
                if let Ok(seed) = modopt1.parse::<u64>() {
                    extra.insert("seed".to_owned(), Value::from(seed));
                }
            }
            _ => {
                if !modopt1.is_empty() {
                    extra.insert("param1".to_owned(), Value::String(modopt1.to_owned()));
                }
                if !modopt2.is_empty() {
                    extra.insert("param2".to_owned(), Value::String(modopt2.to_owned()));
                }
            }
        }

        let frequency = match field(8).parse::<u64>() {
            Ok(khz) => FrequencySpec::Fixed { frequency: khz * 1_000 },
            Err(_) if !field(8).is_empty() => {
                FrequencySpec::Named { frequency_ranges: vec![field(8).to_lowercase()] }
            }
            Err(_) => return Err(ApiError::Validation(format!("missing frequency for {challenge_id}"))),
        };

        let config = ChallengeConfig {
            modulation,
            frequency,
            min_delay,
            max_delay,
            flag: (!flag.is_empty()).then(|| flag.to_owned()),
            flag_file_hash: None,
            public_view: PublicVisibility::default(),
            extra,
        };

        Ok(ChallengeSeed {
                challenge_id: challenge_id.to_owned(),
                name: (!name.is_empty()).then(|| name.to_owned()).unwrap_or_else(|| challenge_id.to_owned()),
                priority: 0,
                config,
        })
    }

    fn parse_or(s: &str, default: u64) -> u64 {
        s.parse().unwrap_or(default)
    }

    fn insert_u32(extra: &mut Map<String, Value>, key: &str, raw: &str) {
        if let Ok(n) = raw.parse::<u32>() {
            extra.insert(key.to_owned(), Value::from(n));
        }
    }
}
