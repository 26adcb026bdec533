// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent adapter contract every per-agent façade implements.
//!
//! An [`AgentAdapter`] locates an agent's on-disk session store, enumerates
//! and watches it, and produces [`SessionDriver`] handles. The daemon owns
//! each driver for its lifetime and releases it by calling [`SessionDriver::detach`].
//! No driver holds a back-pointer to the adapter that created it beyond a
//! copy of its capability data (see SPEC_FULL.md's note on arena-like
//! ownership).

use std::path::PathBuf;
use std::sync::Arc;

use agentbridge_core::{AgentCapabilities, Event, RequestId, SessionId};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors an adapter or driver can surface to the orchestrator.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no server connection and no active process")]
    NoChannel,

    #[error("OpenCode API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("adapter is not installed")]
    NotInstalled,

    #[error("{0}")]
    Other(String),
}

/// A local agent HTTP server located by the daemon's own service-discovery
/// probe (`agentbridge-daemon::discovery`). Handed to an adapter so its
/// drivers can prefer the HTTP/SSE path over spawning a child process.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredServer {
    pub url: String,
    pub version: Option<String>,
}

/// Fixed on-disk locations an adapter reads from and writes hook/plugin
/// artifacts into.
#[derive(Debug, Clone)]
pub struct AgentDataPaths {
    pub sessions_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
}

/// A session entry produced by [`AgentAdapter::discover_sessions`], before
/// any driver is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredSession {
    pub id: SessionId,
    pub agent: String,
    pub project_path: String,
    pub project_name: String,
    pub created_at_ms: i64,
    pub last_activity_ms: i64,
    /// Best-effort preview of the first user message, untruncated and
    /// unfiltered. The orchestrator derives the authoritative `sessionName`
    /// from live `message:complete` events (SPEC_FULL.md §4.4); this is
    /// only shown before a driver is attached.
    pub preview: Option<String>,
}

/// Kind of change a session-store watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Updated,
    Removed,
}

/// One change notification from [`AgentAdapter::watch_sessions`].
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub session_id: SessionId,
    pub agent: String,
}

/// Disposer returned by [`AgentAdapter::watch_sessions`]. Dropping it has
/// the same effect as calling [`WatchHandle::stop`] explicitly.
pub struct WatchHandle {
    cancel: CancellationToken,
    // Keeps the underlying OS watcher (and any background task) alive for
    // as long as the handle is held.
    _guard: Option<Box<dyn Send + Sync>>,
}

impl WatchHandle {
    pub fn new(cancel: CancellationToken, guard: Option<Box<dyn Send + Sync>>) -> Self {
        Self { cancel, _guard: guard }
    }

    /// Stop watching. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A command the daemon relays to a session driver on behalf of a remote client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SendMessage { message: String },
    ApproveToolCall { request_id: RequestId },
    DenyToolCall { request_id: RequestId, reason: Option<String> },
    Cancel,
    Terminate,
}

/// A registered event listener: invoked once per canonical event, in order.
pub type EventListener = Box<dyn Fn(Event) + Send + Sync>;

/// Handle returned by [`SessionDriver::on_event`]. Dropping or calling
/// [`ListenerHandle::unsubscribe`] removes the listener; both are idempotent.
pub struct ListenerHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self { unsubscribe: Some(Box::new(unsubscribe)) }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

/// Per-session object that projects one agent's native events into the
/// canonical event stream and accepts commands. See SPEC_FULL.md §4.3.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// The session id, once known. `None` only briefly, between
    /// construction of a brand-new (unstarted) driver and the first
    /// successful `start()` call.
    fn session_id(&self) -> Option<SessionId>;

    /// Start a brand-new session: create it (HTTP, falling back to process
    /// spawn) and begin live projection.
    async fn start(&self, project_path: &str, prompt: &str) -> Result<(), AdapterError>;

    /// Relay a command to the agent through whatever channel is live.
    async fn execute(&self, command: Command) -> Result<(), AdapterError>;

    /// Stop all watchers/subscriptions/children. Idempotent.
    async fn detach(&self);

    /// Register a listener for every future canonical event. Returns a
    /// handle that unregisters it on drop or explicit `unsubscribe()`.
    fn on_event(&self, listener: EventListener) -> ListenerHandle;

    /// Snapshot of every event emitted so far, in sequence order. Mutating
    /// the returned `Vec` does not affect future calls.
    fn history(&self) -> Vec<Event>;

    /// Best-effort nudge for adapters that need one after a watcher observed
    /// a `session_updated` notification. No-op by default.
    async fn refresh(&self) {}
}

/// Per-agent-kind façade. See SPEC_FULL.md §4.2.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Agent identity and feature flags. Pure.
    fn capabilities(&self) -> AgentCapabilities;

    /// Best-effort: is the agent's CLI on PATH (or its HTTP server reachable)?
    async fn is_installed(&self) -> bool;

    /// Best-effort version string, preferring a discovered server's report.
    async fn get_version(&self) -> Option<String>;

    /// Fixed on-disk locations this adapter reads/writes.
    fn data_paths(&self) -> AgentDataPaths;

    /// Record the agent's local HTTP server, as located by the daemon's
    /// service-discovery probe, so future drivers prefer it over spawning a
    /// child process. `None` means none was found this round. No-op for
    /// adapters with no HTTP integration path.
    fn set_discovered_server(&self, _server: Option<DiscoveredServer>) {}

    /// Enumerate sessions from disk, newest `last_activity` first.
    async fn discover_sessions(&self) -> Result<Vec<DiscoveredSession>, AdapterError>;

    /// Watch the session store for creations/updates/removals.
    fn watch_sessions(&self, on_event: Box<dyn Fn(WatchEvent) + Send + Sync>) -> WatchHandle;

    /// Attach a driver to an existing, on-disk session.
    async fn attach_to_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Arc<dyn SessionDriver>, AdapterError>;

    /// Construct a driver for a brand-new session and start it.
    async fn start_session(
        &self,
        project_path: &str,
        prompt: &str,
    ) -> Result<Arc<dyn SessionDriver>, AdapterError>;
}
