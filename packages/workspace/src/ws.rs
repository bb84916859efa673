//! WebSocket endpoints for real-time collaboration.
//!
//! Two sockets exist: a project socket for roster and sharing events, and a
//! script socket that speaks the full collaboration protocol through the
//! engine. Authentication happens after the upgrade so failures can be
//! reported with distinguishing close codes; no registry state exists until
//! auth and access checks pass.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use renscript_common::identity::{IdentityProvider, User};
use renscript_common::store::{ScriptRecord, ScriptStore};
use renscript_editor::{ClientMessage, ConnectionHandle, ServerEvent};

use crate::state::{AppState, SharedState};

pub const CLOSE_AUTH_FAILURE: u16 = 4001;
pub const CLOSE_PERMISSION_DENIED: u16 = 4003;
pub const CLOSE_NOT_FOUND: u16 = 4004;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn project_socket(
    ws: WebSocketUpgrade,
    Path(project_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_project_socket(socket, state, project_id, query.token))
}

pub async fn script_socket(
    ws: WebSocketUpgrade,
    Path(script_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_script_socket(socket, state, script_id, query.token))
}

/// Auth + access resolution for a project socket, or the close code to send.
pub(crate) fn project_access(
    state: &AppState,
    token: Option<&str>,
    project_id: &str,
) -> Result<User, (u16, &'static str)> {
    let user = token
        .and_then(|t| state.identity.current_user(t).ok())
        .ok_or((CLOSE_AUTH_FAILURE, "Authentication failed"))?;
    if state.store.check_access(&user.id, project_id).is_none() {
        return Err((CLOSE_PERMISSION_DENIED, "Permission denied for this project"));
    }
    Ok(user)
}

/// Auth + access resolution for a script socket, or the close code to send.
pub(crate) fn script_access(
    state: &AppState,
    token: Option<&str>,
    script_id: &str,
) -> Result<(User, ScriptRecord), (u16, &'static str)> {
    let user = token
        .and_then(|t| state.identity.current_user(t).ok())
        .ok_or((CLOSE_AUTH_FAILURE, "Authentication failed"))?;
    let script = state
        .store
        .get_script(script_id)
        .ok_or((CLOSE_NOT_FOUND, "Script not found"))?;
    if state.store.check_access(&user.id, &script.project_id).is_none() {
        return Err((CLOSE_PERMISSION_DENIED, "Permission denied for this script"));
    }
    Ok((user, script))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Splits the socket and spawns the writer task that drains the engine's
/// queued events into the sink. Returns the handle plus the inbound stream.
fn attach_connection(
    socket: WebSocket,
) -> (
    ConnectionHandle,
    futures::stream::SplitStream<WebSocket>,
    tokio::task::JoinHandle<()>,
) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = ConnectionHandle::new(tx);

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    (conn, stream, writer)
}

async fn handle_project_socket(
    socket: WebSocket,
    state: SharedState,
    project_id: String,
    token: Option<String>,
) {
    let user = match project_access(&state, token.as_deref(), &project_id) {
        Ok(user) => user,
        Err((code, reason)) => {
            tracing::warn!(project = %project_id, code, "rejecting project socket");
            return close_with(socket, code, reason).await;
        }
    };

    let (conn, mut stream, writer) = attach_connection(socket);
    state
        .engine
        .connect_project(&conn, &project_id, &user.id, &user.username);

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_project_message(&state, &conn, &project_id, &user, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.engine.disconnect(&conn, Some(&user.id));
    writer.abort();
}

fn handle_project_message(
    state: &AppState,
    conn: &ConnectionHandle,
    project_id: &str,
    user: &User,
    raw: &str,
) {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed project message");
            return;
        }
    };

    match message {
        ClientMessage::Ping => conn.send(&ServerEvent::Pong),

        ClientMessage::ShareProject {
            target_user_id,
            role_id,
        } => match state.store.grant_access(project_id, &target_user_id, &role_id) {
            Ok(()) => {
                state.engine.broadcast_project(
                    project_id,
                    &ServerEvent::ProjectShared {
                        project_id: project_id.to_string(),
                        user_id: target_user_id,
                        role_id,
                        shared_by: user.id.clone(),
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    },
                );
            }
            Err(err) => conn.send(&ServerEvent::Error {
                message: err.to_string(),
            }),
        },

        // Everything else belongs to the script socket.
        _ => {}
    }
}

async fn handle_script_socket(
    socket: WebSocket,
    state: SharedState,
    script_id: String,
    token: Option<String>,
) {
    let (user, _script) = match script_access(&state, token.as_deref(), &script_id) {
        Ok(resolved) => resolved,
        Err((code, reason)) => {
            tracing::warn!(script = %script_id, code, "rejecting script socket");
            return close_with(socket, code, reason).await;
        }
    };

    let (conn, mut stream, writer) = attach_connection(socket);
    state
        .engine
        .connect_script(&conn, &script_id, &user.id, &user.username);

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => state.engine.handle_message(&conn, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.engine.disconnect(&conn, Some(&user.id));
    writer.abort();
}
