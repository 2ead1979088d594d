//! The two WebSocket namespaces: an implicit admin namespace and `/public`,
//! both plain fan-out over the `EventBus`'s two broadcast topics, plus
//! `/agents`, which additionally needs to deliver a `recording_assignment`
//! to one specific listener rather than broadcast it.
//!
//! `ConnectionRegistry` is a per-agent event sender map, distinct from a
//! plain per-tenant connection counter gating broadcast subscriptions:
//! delivery here has to reach one exact connection, not a broadcast group.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use rfctl_eventbus::Event;

use crate::auth::AuthSession;
use crate::auth::agent::AgentAuth;
use crate::state::AppState;

pub type AgentSender = mpsc::UnboundedSender<Event>;

/// Maps an online agent's id to the sender half of its currently open
/// `/agents` socket, if any. An agent with no open socket simply has no
/// entry; pushing to it is a silent no-op (the caller falls back to the
/// next poll of `GET /agents/{id}/task`).
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, AgentSender>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn connect(&self, agent_id: &str) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(agent_id.to_owned(), tx);
        rx
    }

    async fn disconnect(&self, agent_id: &str) {
        self.connections.write().await.remove(agent_id);
    }

    /// Pushes an event to `agent_id`'s open socket. Returns whether a live
    /// connection was actually there to take it.
    pub async fn push(&self, agent_id: &str, event: Event) -> bool {
        self.connections
            .read()
            .await
            .get(agent_id)
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

pub async fn agents(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    auth: AgentAuth,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_agent_socket(socket, state, auth.agent_id))
}

async fn run_agent_socket(socket: WebSocket, state: AppState, agent_id: String) {
    let mut rx = state.connections.connect(&agent_id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.connections.disconnect(&agent_id).await;
    debug!(agent_id, "agent socket closed");
}

pub async fn admin(ws: WebSocketUpgrade, State(state): State<AppState>, _auth: AuthSession) -> impl IntoResponse {
    let rx = state.eventbus.subscribe_admin();
    ws.on_upgrade(move |socket| run_broadcast_socket(socket, rx))
}

pub async fn public(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.eventbus.subscribe_public();
    ws.on_upgrade(move |socket| run_broadcast_socket(socket, rx))
}

async fn run_broadcast_socket(socket: WebSocket, mut rx: tokio::sync::broadcast::Receiver<Event>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
