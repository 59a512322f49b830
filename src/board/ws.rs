use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::SharedState;
use super::auth::{self, Caller};
use super::models::*;
use crate::errors::{BoardError, ErrorKind};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    TaskCreated {
        task: Task,
    },
    TaskUpdated {
        task: Task,
    },
    TaskMoved {
        task_id: i64,
        project_id: i64,
        from_column: TaskStatus,
        to_column: TaskStatus,
        position: i64,
    },
    TaskDeleted {
        task_id: i64,
        project_id: i64,
    },
    ProjectCreated {
        project: Project,
    },
    ProjectUpdated {
        project: Project,
    },
    ProjectDeleted {
        project_id: i64,
    },
}

/// A serialized [`WsMessage`] tagged with the owner of the project it
/// concerns, so each socket can forward only what its caller may see.
#[derive(Debug, Clone)]
pub struct BoardEvent {
    pub owner_id: i64,
    pub payload: String,
}

impl BoardEvent {
    pub fn visible_to(&self, caller: &Caller) -> bool {
        caller.is_admin() || caller.user_id == self.owner_id
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the session
/// token travels as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
) -> Result<Response, BoardError> {
    let token = params
        .token
        .ok_or_else(|| BoardError::unauthorized("missing session token"))?;
    let lookup = token.clone();
    let caller = state
        .db
        .call(move |db| auth::resolve_session(db, &lookup))
        .await?;
    tracing::debug!(user_id = caller.user_id, "websocket subscriber connected");

    let rx = state.events.subscribe();
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, token, caller, rx))
        .into_response())
}

async fn handle_socket(
    socket: WebSocket,
    state: SharedState,
    token: String,
    caller: Caller,
    rx: broadcast::Receiver<BoardEvent>,
) {
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, &state, &token, caller).await;
    tracing::debug!(user_id = caller.user_id, "websocket subscriber disconnected");
}

#[derive(Debug, PartialEq, Eq)]
enum SessionCheck {
    Active(Caller),
    Ended,
}

/// Re-resolve the socket's session token. A logged-out, expired or deleted
/// session ends the subscription; a role change takes effect immediately.
/// Storage errors keep the current caller.
async fn recheck_session(state: &SharedState, token: &str, current: Caller) -> SessionCheck {
    let token = token.to_string();
    match state
        .db
        .call(move |db| auth::resolve_session(db, &token))
        .await
    {
        Ok(caller) => SessionCheck::Active(caller),
        Err(e) if e.kind() == ErrorKind::Unauthorized => SessionCheck::Ended,
        Err(e) => {
            tracing::warn!(user_id = current.user_id, error = %e, "websocket session re-check failed");
            SessionCheck::Active(current)
        }
    }
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding, client message receiving, and periodic
/// ping/pong health checking into a single select loop. If no Pong is
/// received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits. Each ping tick also re-checks the
/// session, so a socket stops receiving events once its session ends.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<BoardEvent>,
    state: &SharedState,
    token: &str,
    mut caller: Caller,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!(user_id = caller.user_id, "websocket pong timeout");
                    break;
                }
                match recheck_session(state, token, caller).await {
                    SessionCheck::Active(current) => caller = current,
                    SessionCheck::Ended => {
                        tracing::debug!(user_id = caller.user_id, "websocket session ended");
                        break;
                    }
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !event.visible_to(&caller) {
                            continue;
                        }
                        if sender.send(Message::Text(event.payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id = caller.user_id, skipped, "websocket subscriber lagged");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage concerning a project owned by
/// `owner_id`. Returns silently even if no clients are connected.
pub fn broadcast_event(tx: &broadcast::Sender<BoardEvent>, owner_id: i64, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(payload) => {
            let _ = tx.send(BoardEvent { owner_id, payload });
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize board event");
        }
    }
}
