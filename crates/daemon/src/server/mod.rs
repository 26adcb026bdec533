// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WebSocket fan-out server: the daemon's sole network-facing
//! surface. Accepts authenticated WebSocket clients, serves the hook
//! long-poll endpoints, and broadcasts canonical events and session-table
//! snapshots to every connected client. SPEC_FULL.md §4.10.

mod hooks;
mod http;
mod state;
mod ws;

pub use hooks::{APPROVAL_TIMEOUT, ApprovalNotifier, HookApprovals, PermissionDecision};
pub use state::{AuthResult, CLIENT_CHANNEL_CAPACITY, DaemonCallbacks};

use std::net::SocketAddr;
use std::sync::Arc;

use agentbridge_core::Event;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};
use state::{AppState, ClientRegistry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::{DaemonError, DaemonResult};

pub struct WsServer {
    local_addr: SocketAddr,
    state: Arc<AppState>,
    task: JoinHandle<()>,
}

impl WsServer {
    /// Bind `addr` and start serving. `addr`'s port is usually `0` in
    /// tests so the kernel assigns a free one; [`WsServer::local_addr`]
    /// reports what was actually bound.
    pub async fn start(addr: SocketAddr, callbacks: Arc<dyn DaemonCallbacks>) -> DaemonResult<Self> {
        let state = Arc::new(AppState {
            callbacks,
            clients: Arc::new(ClientRegistry::default()),
            hook_approvals: Arc::new(HookApprovals::new()),
        });

        let router = build_router(state.clone());
        let listener = TcpListener::bind(addr).await.map_err(DaemonError::Io)?;
        let local_addr = listener.local_addr().map_err(DaemonError::Io)?;

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!(error = %e, "websocket server exited");
            }
        });

        tracing::info!(addr = %local_addr, "websocket server listening");
        Ok(Self { local_addr, state, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.state.clients.count()
    }

    pub fn hook_approvals(&self) -> Arc<HookApprovals> {
        self.state.hook_approvals.clone()
    }

    /// Broadcast one canonical event, wire-shaped as `{type:"event", event:…}`.
    pub fn broadcast_acp_event(&self, event: &Event) {
        self.state.clients.broadcast(json!({"type": "event", "event": event}));
    }

    /// Broadcast an updated session-table snapshot to every client.
    pub fn broadcast_sessions_list(&self, sessions: Value) {
        self.state.clients.broadcast(json!({"type": "sessions", "sessions": sessions}));
    }

    /// Stop accepting connections. Already-open connections are dropped;
    /// each one's read loop observes the close and exits on its own.
    pub fn close(self) {
        self.task.abort();
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/api/hooks/approve", post(http::hooks_approve))
        .route("/api/hooks/health", post(http::hooks_health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(_addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    ws.on_upgrade(move |socket| ws::handle_connection(socket, state, header_token))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
