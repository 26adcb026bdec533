// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain HTTP endpoints alongside the WebSocket upgrade: a health probe
//! used by [`crate::discovery`] and the hook long-poll endpoints used by
//! the injected agent scripts. SPEC_FULL.md §4.10.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::hooks::{APPROVAL_TIMEOUT, PermissionDecision};
use super::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.clients.count(),
    }))
}

#[derive(Deserialize)]
pub struct HookApproveRequest {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Long-polls up to [`APPROVAL_TIMEOUT`] for a remote client to approve,
/// deny, or ignore the tool call. A timeout resolves to `ask`, which
/// tells the calling hook script to fall back to the agent's own prompt.
pub async fn hooks_approve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HookApproveRequest>,
) -> Json<Value> {
    let (request_id, rx) = state.hook_approvals.register(request.tool, request.args);

    let decision = match tokio::time::timeout(APPROVAL_TIMEOUT, rx).await {
        Ok(Ok(decision)) => decision,
        Ok(Err(_)) | Err(_) => {
            state.hook_approvals.forget(&request_id);
            PermissionDecision::Ask
        }
    };

    Json(json!({"hookSpecificOutput": {"permissionDecision": decision}}))
}

/// Fire-and-forget liveness ping some agent hook scripts send before
/// attempting an approval call, so they can skip the daemon round trip
/// entirely when it's not running.
pub async fn hooks_health() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
