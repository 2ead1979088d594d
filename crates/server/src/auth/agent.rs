//! Bearer + host-binding authentication for runner/listener requests (,
//!: "Runners/listeners: `Authorization: Bearer <api_key>`, plus custom
//! `X-Runner-MAC` and `X-Runner-Machine-ID` for host binding").

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// An agent request that has passed bearer authentication and the
/// multi-factor host-binding check, carrying the resolved `agent_id`.
pub struct AgentAuth {
    pub agent_id: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
    .headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl FromRequestParts<AppState> for AgentAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let api_key = bearer_token(parts).ok_or(ApiError::AuthMissing)?;

        let forwarded_ip = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
        let socket_ip = parts
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
        let current_ip = forwarded_ip.map(str::to_owned).or(socket_ip).unwrap_or_default();

        let current_hostname = header_str(parts, "x-runner-hostname").unwrap_or_default();
        let current_mac = header_str(parts, "x-runner-mac");
        let current_machine_id = header_str(parts, "x-runner-machine-id");

        let agent_id = state
        .registry
        .verify_request(api_key, &current_ip, current_hostname, current_mac, current_machine_id)
        .await?
        .ok_or(ApiError::AuthInvalid)?;

        Ok(Self { agent_id })
    }
}
