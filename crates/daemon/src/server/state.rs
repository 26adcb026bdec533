// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback contract the orchestrator implements for the WebSocket/HTTP
//! server to call back into, and the shared state every request handler
//! reads. SPEC_FULL.md §4.10.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentbridge_adapters::Command;
use agentbridge_core::{Event, SessionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::hooks::HookApprovals;

pub struct AuthResult {
    pub valid: bool,
    pub user_id: Option<String>,
}

/// Callbacks the orchestrator wires in at startup (SPEC_FULL.md §4.4
/// step 1). One instance is shared across every connection.
#[async_trait]
pub trait DaemonCallbacks: Send + Sync {
    async fn on_auth(&self, token: &str) -> AuthResult;
    async fn on_command(&self, session_id: SessionId, command: Command) -> Result<(), String>;
    async fn on_terminate_session(&self, session_id: SessionId) -> Result<(), String>;
    async fn on_start_session(
        &self,
        agent: String,
        project_path: String,
        prompt: String,
    ) -> Result<SessionId, String>;
    async fn get_sessions(&self) -> Value;
    async fn get_capabilities(&self) -> Value;
    async fn get_session_history(&self, session_id: SessionId) -> Result<Vec<Event>, String>;
    async fn on_client_authenticated(&self);
}

/// Per-client outbound queue. Bounded: a full queue means the client is
/// the slowest reader in the room and gets dropped rather than stalling
/// every other broadcast (SPEC_FULL.md §5, "Backpressure").
pub const CLIENT_CHANNEL_CAPACITY: usize = 256;

pub struct ClientHandle {
    pub id: u64,
    pub tx: mpsc::Sender<Value>,
}

#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<Vec<ClientHandle>>,
}

impl ClientRegistry {
    pub fn register(&self) -> (u64, mpsc::Receiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        self.clients.lock().push(ClientHandle { id, tx });
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.clients.lock().retain(|c| c.id != id);
    }

    pub fn count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send `message` to every client. A client whose queue is full is
    /// dropped from the registry (logged), not blocked on.
    pub fn broadcast(&self, message: Value) {
        let mut dropped = Vec::new();
        for client in self.clients.lock().iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = client.tx.try_send(message.clone()) {
                tracing::warn!(client_id = client.id, "client queue full, dropping client");
                dropped.push(client.id);
            }
        }
        if !dropped.is_empty() {
            self.clients.lock().retain(|c| !dropped.contains(&c.id));
        }
    }
}

pub struct AppState {
    pub callbacks: Arc<dyn DaemonCallbacks>,
    pub clients: Arc<ClientRegistry>,
    pub hook_approvals: Arc<HookApprovals>,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
