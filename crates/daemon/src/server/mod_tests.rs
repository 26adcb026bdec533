// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use agentbridge_adapters::Command;
use agentbridge_core::{Event, EventPayload, SequenceRegistry, SessionId};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::*;

struct FakeCallbacks {
    valid_token: String,
    authenticated: AtomicBool,
}

#[async_trait]
impl DaemonCallbacks for FakeCallbacks {
    async fn on_auth(&self, token: &str) -> AuthResult {
        AuthResult { valid: token == self.valid_token, user_id: Some("tester".to_string()) }
    }
    async fn on_command(&self, _session_id: SessionId, _command: Command) -> Result<(), String> {
        Ok(())
    }
    async fn on_terminate_session(&self, _session_id: SessionId) -> Result<(), String> {
        Ok(())
    }
    async fn on_start_session(&self, _agent: String, _project_path: String, _prompt: String) -> Result<SessionId, String> {
        Ok(SessionId::from("new-session"))
    }
    async fn get_sessions(&self) -> Value {
        json!([{"sessionId": "sess-1", "status": "running"}])
    }
    async fn get_capabilities(&self) -> Value {
        json!({"opencode": {"agent": "opencode"}})
    }
    async fn get_session_history(&self, _session_id: SessionId) -> Result<Vec<Event>, String> {
        Ok(Vec::new())
    }
    async fn on_client_authenticated(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
    }
}

async fn start_test_server() -> WsServer {
    let callbacks = Arc::new(FakeCallbacks {
        valid_token: "secret".to_string(),
        authenticated: AtomicBool::new(false),
    });
    WsServer::start("127.0.0.1:0".parse().unwrap(), callbacks).await.unwrap()
}

#[tokio::test]
async fn rejects_connection_with_wrong_token() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws", server.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();

    ws.send(WsMessage::Text(r#"{"type":"auth","token":"wrong"}"#.into())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(body["type"], "error");
}

#[tokio::test]
async fn accepts_connection_and_sends_sessions_snapshot() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws", server.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();

    ws.send(WsMessage::Text(r#"{"type":"auth","token":"secret"}"#.into())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(body["type"], "sessions");
    assert_eq!(body["sessions"][0]["sessionId"], "sess-1");
    assert_eq!(server.client_count(), 1);
}

#[tokio::test]
async fn authenticates_via_authorization_header() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws", server.local_addr());
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert("Authorization", "Bearer secret".parse().unwrap());

    let (mut ws, _) = connect_async(request).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(body["type"], "sessions");
}

#[tokio::test]
async fn get_capabilities_round_trips() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws", server.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(WsMessage::Text(r#"{"type":"auth","token":"secret"}"#.into())).await.unwrap();
    ws.next().await.unwrap().unwrap();

    ws.send(WsMessage::Text(r#"{"type":"get_capabilities"}"#.into())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(body["type"], "capabilities");
    assert_eq!(body["capabilities"]["opencode"]["agent"], "opencode");
}

#[tokio::test]
async fn broadcast_acp_event_reaches_connected_client() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws", server.local_addr());
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(WsMessage::Text(r#"{"type":"auth","token":"secret"}"#.into())).await.unwrap();
    ws.next().await.unwrap().unwrap();

    let seq = SequenceRegistry::new();
    let session_id = SessionId::from("sess-1");
    let event = seq.create_event(
        session_id,
        "2026-07-28T00:00:00Z",
        EventPayload::SessionStatusChanged {
            from: agentbridge_core::SessionStatus::Starting,
            to: agentbridge_core::SessionStatus::Running,
        },
    );
    server.broadcast_acp_event(&event);

    let reply = ws.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(body["type"], "event");
    assert_eq!(body["event"]["sessionId"], "sess-1");
}

#[tokio::test]
async fn health_endpoint_is_reachable_over_plain_http() {
    let server = start_test_server().await;
    let url = format!("http://{}/health", server.local_addr());
    let response = reqwest::get(&url).await.unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
