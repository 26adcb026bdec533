// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection WebSocket handling. SPEC_FULL.md §4.10: a bearer token
//! arrives either as the first text frame or as an `Authorization` header
//! on the upgrade request; once authenticated the connection receives a
//! sessions snapshot, then a mix of broadcast events and command replies
//! until it disconnects.

use std::sync::Arc;
use std::time::Duration;

use agentbridge_adapters::Command;
use agentbridge_core::{RequestId, SessionId};
use axum::extract::ws::{Message, WebSocket};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;

use super::state::AppState;

const AUTH_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Auth { token: String },
    Command { #[serde(rename = "sessionId")] session_id: SessionId, command: WireCommand },
    StartSession { agent: String, #[serde(rename = "projectPath")] project_path: String, prompt: String },
    Terminate { #[serde(rename = "sessionId")] session_id: SessionId },
    GetSessions,
    GetHistory { #[serde(rename = "sessionId")] session_id: SessionId },
    GetCapabilities,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireCommand {
    SendMessage { message: String },
    ApproveToolCall { #[serde(rename = "requestId")] request_id: RequestId },
    DenyToolCall { #[serde(rename = "requestId")] request_id: RequestId, reason: Option<String> },
    Cancel,
    Terminate,
}

impl From<WireCommand> for Command {
    fn from(wire: WireCommand) -> Self {
        match wire {
            WireCommand::SendMessage { message } => Command::SendMessage { message },
            WireCommand::ApproveToolCall { request_id } => Command::ApproveToolCall { request_id },
            WireCommand::DenyToolCall { request_id, reason } => Command::DenyToolCall { request_id, reason },
            WireCommand::Cancel => Command::Cancel,
            WireCommand::Terminate => Command::Terminate,
        }
    }
}

/// Drive one accepted WebSocket connection to completion. Never panics:
/// every client-supplied payload is fallible-parsed, and a malformed
/// frame gets an error reply rather than dropping the connection.
pub async fn handle_connection(mut socket: WebSocket, state: Arc<AppState>, header_token: Option<String>) {
    let token = match header_token {
        Some(t) => t,
        None => match next_text_frame(&mut socket).await {
            Some(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Auth { token }) => token,
                _ => {
                    let _ = send_json(&mut socket, &json!({"type": "error", "message": "expected auth frame"})).await;
                    return;
                }
            },
            None => return,
        },
    };

    let auth = state.callbacks.on_auth(&token).await;
    if !auth.valid {
        let _ = send_json(&mut socket, &json!({"type": "error", "message": "unauthorized"})).await;
        return;
    }

    let (client_id, mut outbound_rx) = state.clients.register();
    tracing::info!(client_id, "client authenticated");
    state.callbacks.on_client_authenticated().await;

    let snapshot = state.callbacks.get_sessions().await;
    if send_json(&mut socket, &json!({"type": "sessions", "sessions": snapshot})).await.is_err() {
        state.clients.unregister(client_id);
        return;
    }

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_json(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&mut socket, &state, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(client_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.clients.unregister(client_id);
    tracing::info!(client_id, "client disconnected");
}

async fn handle_client_message(socket: &mut WebSocket, state: &Arc<AppState>, text: &str) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let reply = match parsed {
        Ok(ClientMessage::Auth { .. }) => None,
        Ok(ClientMessage::Command { session_id, command }) => {
            match state.callbacks.on_command(session_id, command.into()).await {
                Ok(()) => None,
                Err(e) => Some(json!({"type": "error", "message": e})),
            }
        }
        Ok(ClientMessage::StartSession { agent, project_path, prompt }) => {
            match state.callbacks.on_start_session(agent, project_path, prompt).await {
                Ok(session_id) => Some(json!({"type": "session_started", "sessionId": session_id})),
                Err(e) => Some(json!({"type": "error", "message": e})),
            }
        }
        Ok(ClientMessage::Terminate { session_id }) => {
            match state.callbacks.on_terminate_session(session_id).await {
                Ok(()) => None,
                Err(e) => Some(json!({"type": "error", "message": e})),
            }
        }
        Ok(ClientMessage::GetSessions) => {
            Some(json!({"type": "sessions", "sessions": state.callbacks.get_sessions().await}))
        }
        Ok(ClientMessage::GetHistory { session_id }) => {
            match state.callbacks.get_session_history(session_id.clone()).await {
                Ok(events) => Some(json!({"type": "history", "sessionId": session_id, "events": events})),
                Err(e) => Some(json!({"type": "error", "message": e})),
            }
        }
        Ok(ClientMessage::GetCapabilities) => {
            Some(json!({"type": "capabilities", "capabilities": state.callbacks.get_capabilities().await}))
        }
        Err(e) => Some(json!({"type": "error", "message": format!("malformed message: {e}")})),
    };

    if let Some(reply) = reply {
        let _ = send_json(socket, &reply).await;
    }
}

async fn next_text_frame(socket: &mut WebSocket) -> Option<String> {
    match timeout(AUTH_FRAME_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(text.to_string()),
        _ => None,
    }
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod ws_tests;
