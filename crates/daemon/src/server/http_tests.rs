// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use agentbridge_core::{Event, SessionId};
use async_trait::async_trait;
use axum::Json;
use axum::extract::State;

use super::*;
use crate::server::state::{AppState, ClientRegistry, DaemonCallbacks};

struct NoopCallbacks;

#[async_trait]
impl DaemonCallbacks for NoopCallbacks {
    async fn on_auth(&self, _token: &str) -> AuthResult {
        AuthResult { valid: true, user_id: None }
    }
    async fn on_command(&self, _session_id: SessionId, _command: agentbridge_adapters::Command) -> Result<(), String> {
        Ok(())
    }
    async fn on_terminate_session(&self, _session_id: SessionId) -> Result<(), String> {
        Ok(())
    }
    async fn on_start_session(&self, _agent: String, _project_path: String, _prompt: String) -> Result<SessionId, String> {
        Ok(SessionId::from("sess-1"))
    }
    async fn get_sessions(&self) -> Value {
        json!([])
    }
    async fn get_capabilities(&self) -> Value {
        json!({})
    }
    async fn get_session_history(&self, _session_id: SessionId) -> Result<Vec<Event>, String> {
        Ok(Vec::new())
    }
    async fn on_client_authenticated(&self) {}
}

fn fresh_state() -> Arc<AppState> {
    Arc::new(AppState {
        callbacks: Arc::new(NoopCallbacks),
        clients: Arc::new(ClientRegistry::default()),
        hook_approvals: Arc::new(HookApprovals::new()),
    })
}

#[tokio::test]
async fn health_reports_client_count() {
    let state = fresh_state();
    let Json(body) = health(State(state)).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 0);
}

#[tokio::test]
async fn hooks_health_returns_200() {
    assert_eq!(hooks_health().await, axum::http::StatusCode::OK);
}

#[tokio::test]
async fn hooks_approve_resolves_when_client_decides() {
    let state = fresh_state();
    let approvals = state.hook_approvals.clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    approvals.set_notifier(Arc::new(move |request_id, _tool, _args| {
        let _ = tx.send(request_id);
    }));

    let resolver = state.hook_approvals.clone();
    tokio::spawn(async move {
        if let Some(request_id) = rx.recv().await {
            resolver.resolve(&request_id, PermissionDecision::Deny);
        }
    });

    let request = HookApproveRequest { tool: "Bash".to_string(), args: json!({"command": "rm -rf /"}) };
    let Json(body) = hooks_approve(State(state), Json(request)).await;
    assert_eq!(body["hookSpecificOutput"]["permissionDecision"], "deny");
}
