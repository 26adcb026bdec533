// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The OpenCode session driver: loads history, watches the store, optionally
//! subscribes to the agent's SSE stream, spawns the agent as a child if
//! needed, and translates every source into canonical events through the
//! shared [`ProjectionState`] dedup table. See SPEC_FULL.md §4.3.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use agentbridge_core::{
    AgentCapabilities, Event, EventPayload, RequestId, SequenceRegistry, SessionId, SessionStatus,
    ToolCallId,
};
use futures_util::StreamExt;
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use reqwest_eventsource::{Event as SseStreamEvent, EventSource};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::{AdapterError, Command, EventListener, ListenerHandle, SessionDriver};
use super::http::{OpenCodeClient, ServerInfo};
use super::paths;
use super::projection::{project_assistant_message, project_user_message, ProjectionState};
use super::types::{sse_session_id, MessageRecord, PartRecord, SseEnvelope};

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

struct Inner {
    session_id: Option<SessionId>,
    status: SessionStatus,
    projection: ProjectionState,
    history: Vec<Event>,
    listeners: HashMap<u64, EventListener>,
    child: Option<Child>,
    stdin: Option<tokio::process::ChildStdin>,
    /// Maps a pending approval's requestId to the toolCallId it was raised for.
    pending_approvals: HashMap<String, String>,
}

/// Per-session projection + command surface for the OpenCode adapter.
pub struct OpenCodeDriver {
    inner: Mutex<Inner>,
    next_listener_id: AtomicU64,
    seq: Arc<SequenceRegistry>,
    storage_root: PathBuf,
    capabilities: AgentCapabilities,
    server: Option<ServerInfo>,
    client: Option<OpenCodeClient>,
    cli_path: String,
    cancel: CancellationToken,
    self_weak: Weak<Self>,
}

impl OpenCodeDriver {
    pub fn new(
        session_id: Option<SessionId>,
        storage_root: PathBuf,
        capabilities: AgentCapabilities,
        server: Option<ServerInfo>,
        project_dir: Option<String>,
        seq: Arc<SequenceRegistry>,
        cli_path: impl Into<String>,
    ) -> Arc<Self> {
        let client = server.as_ref().map(|s| OpenCodeClient::new(s.url.clone()));
        let agent_name = capabilities.agent.clone();
        let cli_path = cli_path.into();
        Arc::new_cyclic(|weak| Self {
            inner: Mutex::new(Inner {
                session_id,
                status: SessionStatus::Idle,
                projection: ProjectionState::new(agent_name, project_dir),
                history: Vec::new(),
                listeners: HashMap::new(),
                child: None,
                stdin: None,
                pending_approvals: HashMap::new(),
            }),
            next_listener_id: AtomicU64::new(0),
            seq,
            storage_root,
            capabilities,
            server,
            client,
            cli_path,
            cancel: CancellationToken::new(),
            self_weak: weak.clone(),
        })
    }

    fn project_dir(&self) -> Option<String> {
        self.inner.lock().projection.project_dir.clone()
    }

    fn emit(&self, session_id: &SessionId, payload: EventPayload) {
        let event = self.seq.create_event(session_id.clone(), now_iso(), payload);
        let mut inner = self.inner.lock();
        inner.history.push(event.clone());
        for listener in inner.listeners.values() {
            listener(event.clone());
        }
    }

    fn emit_many(&self, session_id: &SessionId, payloads: Vec<EventPayload>) {
        for payload in payloads {
            self.emit(session_id, payload);
        }
    }

    fn set_status(&self, session_id: &SessionId, to: SessionStatus) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.status;
            inner.status = to;
            from
        };
        if from != to {
            self.emit(session_id, EventPayload::SessionStatusChanged { from, to });
        }
    }

    /// Enumerate `message/<sessionId>/*.json` (sorted lexicographically) and
    /// their `part/<messageId>/*.json`, feeding each pair through the
    /// projector. Unreadable/malformed files are skipped silently.
    pub async fn load_history(&self) -> Result<(), AdapterError> {
        let Some(session_id) = self.inner.lock().session_id.clone() else { return Ok(()) };
        let message_dir = paths::message_dir(&self.storage_root, session_id.as_str());
        let mut message_files = match tokio::fs::read_dir(&message_dir).await {
            Ok(mut dir) => {
                let mut names = Vec::new();
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("json") {
                        names.push(path);
                    }
                }
                names
            }
            Err(_) => return Ok(()),
        };
        message_files.sort();

        for path in message_files {
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(msg) = serde_json::from_slice::<MessageRecord>(&bytes) else { continue };
            let parts = self.load_parts(&msg.id).await;
            self.apply_message(&session_id, &msg, &parts);
        }
        Ok(())
    }

    async fn load_parts(&self, message_id: &str) -> Vec<PartRecord> {
        let dir = paths::part_dir(&self.storage_root, message_id);
        let mut part_files = match tokio::fs::read_dir(&dir).await {
            Ok(mut dir) => {
                let mut names = Vec::new();
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("json") {
                        names.push(path);
                    }
                }
                names
            }
            Err(_) => return Vec::new(),
        };
        part_files.sort();
        let mut parts = Vec::with_capacity(part_files.len());
        for path in part_files {
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(part) = serde_json::from_slice::<PartRecord>(&bytes) {
                    parts.push(part);
                }
            }
        }
        parts
    }

    fn apply_message(&self, session_id: &SessionId, msg: &MessageRecord, parts: &[PartRecord]) {
        let events = {
            let mut inner = self.inner.lock();
            match msg.role.as_str() {
                "user" => project_user_message(&mut inner.projection, msg, parts),
                "assistant" => project_assistant_message(&mut inner.projection, msg, parts),
                _ => Vec::new(),
            }
        };
        self.emit_many(session_id, events);
    }

    /// Start a file watcher on `message/<sessionId>` and `part/`, re-reading
    /// and re-projecting the affected message whenever a JSON file changes.
    pub fn start_file_watcher(self: &Arc<Self>) {
        let Some(session_id) = self.inner.lock().session_id.clone() else { return };
        let message_dir = paths::message_dir(&self.storage_root, session_id.as_str());
        let part_root = self.storage_root.join("part");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Event>();

        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!("failed to create file watcher for session {}: {}", session_id, e);
                return;
            }
        };
        let _ = std::fs::create_dir_all(&message_dir);
        let _ = std::fs::create_dir_all(&part_root);
        if watcher.watch(&message_dir, RecursiveMode::NonRecursive).is_err() {
            warn!("message dir not watchable: {}", message_dir.display());
        }
        if watcher.watch(&part_root, RecursiveMode::Recursive).is_err() {
            warn!("part dir not watchable: {}", part_root.display());
        }

        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_event = rx.recv() => {
                        let Some(event) = maybe_event else { break };
                        this.handle_fs_event(&session_id, event).await;
                    }
                }
            }
        });
    }

    async fn handle_fs_event(&self, session_id: &SessionId, event: notify::Event) {
        for path in event.paths {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(message_id) = self.message_id_for_path(&path) else { continue };
            let message_path = paths::message_dir(&self.storage_root, session_id.as_str()).join(format!("{message_id}.json"));
            let Ok(bytes) = tokio::fs::read(&message_path).await else { continue };
            let Ok(msg) = serde_json::from_slice::<MessageRecord>(&bytes) else { continue };
            let parts = self.load_parts(&message_id).await;
            self.apply_message(session_id, &msg, &parts);
        }
    }

    /// A changed path is either `message/<sessionId>/<messageId>.json` or
    /// `part/<messageId>/<partId>.json`; in both cases the message id is
    /// derivable from the path shape.
    fn message_id_for_path(&self, path: &std::path::Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?.to_string();
        let parent_name = path.parent()?.file_name()?.to_str()?;
        if parent_name == "part" {
            // part/<messageId>/... would mean the watched dir itself was
            // matched; the real message id is the parent directory's name
            // for a part/<messageId>/<partId>.json path.
            return None;
        }
        // message/<sessionId>/<messageId>.json -> messageId is the stem.
        // part/<messageId>/<partId>.json -> messageId is the parent dir name.
        if path.components().any(|c| c.as_os_str() == "part") {
            Some(parent_name.to_string())
        } else {
            Some(stem)
        }
    }

    /// Subscribe to the OpenCode server's SSE stream, if one is known.
    pub fn start_sse(self: &Arc<Self>) {
        let Some(server) = &self.server else { return };
        let Some(session_id) = self.inner.lock().session_id.clone() else { return };
        let url = format!("{}/event", server.url);
        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let request = client.get(&url);
            let mut source = match EventSource::new(request) {
                Ok(s) => s,
                Err(e) => {
                    warn!("failed to open SSE stream at {}: {}", url, e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = source.next() => {
                        match next {
                            Some(Ok(SseStreamEvent::Message(msg))) => {
                                if let Ok(envelope) = serde_json::from_str::<SseEnvelope>(&msg.data) {
                                    this.handle_sse_envelope(&session_id, envelope).await;
                                }
                            }
                            Some(Ok(SseStreamEvent::Open)) => {}
                            Some(Err(_)) => break,
                            None => break,
                        }
                    }
                }
            }
        });
    }

    async fn handle_sse_envelope(&self, session_id: &SessionId, envelope: SseEnvelope) {
        if let Some(event_session) = sse_session_id(&envelope.properties) {
            if event_session != session_id.as_str() {
                return;
            }
        }
        match envelope.kind.as_str() {
            "permission.asked" => self.handle_permission_asked(session_id, &envelope.properties),
            "permission.replied" => self.handle_permission_replied(session_id, &envelope.properties),
            "message.part.updated" => {
                if let Some(part_value) = envelope.properties.get("part") {
                    if let Ok(part) = serde_json::from_value::<PartRecord>(part_value.clone()) {
                        self.handle_live_part(session_id, part_value, &part).await;
                    }
                }
            }
            "message.updated" => {
                if let Some(info) = envelope.properties.get("info") {
                    if let Ok(msg) = serde_json::from_value::<MessageRecord>(info.clone()) {
                        let parts = self.load_parts(&msg.id).await;
                        self.apply_message(session_id, &msg, &parts);
                    }
                }
            }
            _ => {}
        }
    }

    async fn handle_live_part(&self, session_id: &SessionId, raw: &serde_json::Value, part: &PartRecord) {
        let Some(message_id) = raw.get("messageID").and_then(|v| v.as_str()) else { return };
        let parts = self.load_parts(message_id).await;
        // Ensure the freshly-arrived part is reflected even if disk hasn't
        // caught up with the SSE push yet.
        let mut merged = parts;
        if !merged.iter().any(|p| p.id == part.id) {
            merged.push(part.clone());
        }
        let message_path = paths::message_dir(&self.storage_root, session_id.as_str()).join(format!("{message_id}.json"));
        if let Ok(bytes) = tokio::fs::read(&message_path).await {
            if let Ok(msg) = serde_json::from_slice::<MessageRecord>(&bytes) {
                self.apply_message(session_id, &msg, &merged);
            }
        }
    }

    fn handle_permission_asked(&self, session_id: &SessionId, properties: &serde_json::Value) {
        let request_id = properties
            .get("permissions")
            .and_then(|p| p.get("id"))
            .or_else(|| properties.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let tool_call_id = properties
            .get("permissions")
            .and_then(|p| p.get("tool"))
            .and_then(|t| t.get("callID"))
            .and_then(|v| v.as_str())
            .unwrap_or(&request_id)
            .to_string();
        let tool_name = properties
            .get("permissions")
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let patterns: Vec<String> = properties
            .get("permissions")
            .and_then(|p| p.get("patterns"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let metadata = properties.get("permissions").and_then(|p| p.get("metadata")).cloned().unwrap_or_default();
        let project_root = self.project_dir();
        let risk_level = agentbridge_core::assess_risk(&tool_name, &metadata, project_root.as_deref());
        let description = if patterns.is_empty() {
            format!("Approve {tool_name}?")
        } else {
            format!("Approve {tool_name}: {}", patterns.join(", "))
        };
        let expires_at = (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();

        self.inner.lock().pending_approvals.insert(request_id.clone(), tool_call_id.clone());
        self.set_status(session_id, SessionStatus::WaitingForApproval);
        self.emit(
            session_id,
            EventPayload::ApprovalRequested {
                request_id: RequestId::new(request_id),
                tool_call_id: ToolCallId::new(tool_call_id),
                tool_name,
                tool_input: metadata,
                description,
                risk_level,
                expires_at,
                preview: agentbridge_core::ApprovalPreview { title: None, patterns },
            },
        );
    }

    fn handle_permission_replied(&self, session_id: &SessionId, properties: &serde_json::Value) {
        let reply = properties.get("response").and_then(|v| v.as_str()).unwrap_or("reject");
        match reply {
            "once" | "always" => self.set_status(session_id, SessionStatus::Running),
            _ => self.set_status(session_id, SessionStatus::Error),
        }
    }

    /// HTTP mode happy path, falling back to process spawn on any failure.
    pub async fn start_new_session(self: &Arc<Self>, project_path: &str, prompt: &str) -> Result<(), AdapterError> {
        let placeholder_id = SessionId::new(format!("pending-{}", uuid::Uuid::new_v4()));
        {
            let mut inner = self.inner.lock();
            inner.session_id = Some(placeholder_id.clone());
            inner.projection.project_dir = Some(project_path.to_string());
        }
        self.seq.reset_sequence(&placeholder_id);
        self.set_status(&placeholder_id, SessionStatus::Starting);

        if let Some(client) = &self.client {
            match client.create_session(project_path).await {
                Ok(real_id) => {
                    let real_id = SessionId::new(real_id);
                    self.seq.reset_sequence(&real_id);
                    {
                        let mut inner = self.inner.lock();
                        inner.session_id = Some(real_id.clone());
                    }
                    if let Err(e) = client.send_message(real_id.as_str(), project_path, prompt).await {
                        warn!("failed to send initial prompt over HTTP, falling back to process: {}", e);
                        return self.start_process_fallback(&real_id, project_path, prompt).await;
                    }
                    self.set_status(&real_id, SessionStatus::Running);
                    let project_name = project_name(project_path);
                    self.emit(
                        &real_id,
                        EventPayload::SessionStarted {
                            agent: self.capabilities.agent.clone(),
                            project_path: project_path.to_string(),
                            project_name,
                            working_directory: project_path.to_string(),
                        },
                    );
                    self.start_file_watcher();
                    self.start_sse();
                    return Ok(());
                }
                Err(e) => {
                    info!("OpenCode server unreachable ({}), falling back to process spawn", e);
                }
            }
        }

        self.start_process_fallback(&placeholder_id, project_path, prompt).await
    }

    async fn start_process_fallback(
        self: &Arc<Self>,
        session_id: &SessionId,
        project_path: &str,
        prompt: &str,
    ) -> Result<(), AdapterError> {
        let mut command = tokio::process::Command::new(&self.cli_path);
        command
            .args(["run", prompt, "--format", "json"])
            .current_dir(project_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            self.emit(
                session_id,
                EventPayload::SessionErrorEvent {
                    error: agentbridge_core::SessionError {
                        code: "SPAWN_ERROR".to_string(),
                        message: e.to_string(),
                        recoverable: false,
                    },
                },
            );
            AdapterError::Spawn(e)
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();
        {
            let mut inner = self.inner.lock();
            inner.child = Some(child);
            inner.stdin = stdin;
        }

        self.set_status(session_id, SessionStatus::Running);
        self.emit(
            session_id,
            EventPayload::SessionStarted {
                agent: self.capabilities.agent.clone(),
                project_path: project_path.to_string(),
                project_name: project_name(project_path),
                working_directory: project_path.to_string(),
            },
        );

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("opencode stderr: {}", line);
                }
            });
        }

        if let Some(stdout) = stdout {
            let this = Arc::clone(self);
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else { continue };
                    if value.get("type").is_some() && value.get("sessionID").is_some() {
                        if let Ok(envelope) = serde_json::from_value::<SseEnvelope>(value) {
                            this.handle_sse_envelope(&session_id, envelope).await;
                        }
                    }
                }
            });
        }

        self.watch_child_exit(session_id.clone());
        Ok(())
    }

    fn watch_child_exit(self: &Arc<Self>, session_id: SessionId) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let status = {
                let mut inner = this.inner.lock();
                inner.child.take()
            };
            let Some(mut child) = status else { return };
            match child.wait().await {
                Ok(status) if status.success() => {
                    this.set_status(&session_id, SessionStatus::Completed);
                    this.emit(&session_id, EventPayload::SessionCompleted { summary: None });
                }
                _ => {
                    this.set_status(&session_id, SessionStatus::Error);
                    this.emit(
                        &session_id,
                        EventPayload::SessionErrorEvent {
                            error: agentbridge_core::SessionError {
                                code: "PROCESS_ERROR".to_string(),
                                message: "agent process exited with a non-zero status".to_string(),
                                recoverable: false,
                            },
                        },
                    );
                }
            }
        });
    }
}

fn project_name(path: &str) -> String {
    super::projection::project_name_from_directory(path)
}

#[async_trait::async_trait]
impl SessionDriver for OpenCodeDriver {
    fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().session_id.clone()
    }

    async fn start(&self, project_path: &str, prompt: &str) -> Result<(), AdapterError> {
        let this = self
            .self_weak
            .upgrade()
            .ok_or_else(|| AdapterError::Other("driver no longer owned".to_string()))?;
        this.start_new_session(project_path, prompt).await
    }

    async fn execute(&self, command: Command) -> Result<(), AdapterError> {
        let Some(session_id) = self.session_id() else { return Err(AdapterError::NoChannel) };
        let project_dir = self.project_dir().unwrap_or_default();
        let has_child = self.inner.lock().child.is_some();

        match command {
            Command::SendMessage { message } => {
                if let Some(client) = &self.client {
                    client.send_message(session_id.as_str(), &project_dir, &message).await
                } else {
                    let stdin = self.inner.lock().stdin.take();
                    let Some(mut stdin) = stdin else { return Err(AdapterError::NoChannel) };
                    let mut line = message;
                    line.push('\n');
                    let result = stdin.write_all(line.as_bytes()).await;
                    self.inner.lock().stdin = Some(stdin);
                    result.map_err(|e| AdapterError::Other(e.to_string()))
                }
            }
            Command::ApproveToolCall { request_id } => {
                let Some(client) = &self.client else { return Err(AdapterError::NoChannel) };
                client.reply_permission(request_id.as_str(), &project_dir, "once", None).await?;
                let tool_call_id = self
                    .inner
                    .lock()
                    .pending_approvals
                    .get(request_id.as_str())
                    .cloned()
                    .unwrap_or_else(|| request_id.as_str().to_string());
                self.emit(
                    &session_id,
                    EventPayload::ApprovalResolved {
                        request_id,
                        tool_call_id: ToolCallId::new(tool_call_id),
                        approved: true,
                        resolved_by: "user".to_string(),
                        reason: None,
                    },
                );
                Ok(())
            }
            Command::DenyToolCall { request_id, reason } => {
                let Some(client) = &self.client else { return Err(AdapterError::NoChannel) };
                client
                    .reply_permission(request_id.as_str(), &project_dir, "reject", reason.as_deref())
                    .await?;
                let tool_call_id = self
                    .inner
                    .lock()
                    .pending_approvals
                    .get(request_id.as_str())
                    .cloned()
                    .unwrap_or_else(|| request_id.as_str().to_string());
                self.emit(
                    &session_id,
                    EventPayload::ApprovalResolved {
                        request_id,
                        tool_call_id: ToolCallId::new(tool_call_id),
                        approved: false,
                        resolved_by: "user".to_string(),
                        reason,
                    },
                );
                Ok(())
            }
            Command::Cancel => {
                if let Some(client) = &self.client {
                    client.abort(session_id.as_str(), &project_dir).await
                } else if has_child {
                    let pid = self.inner.lock().child.as_ref().and_then(|c| c.id());
                    if let Some(pid) = pid {
                        send_interrupt(pid);
                    }
                    Ok(())
                } else {
                    Ok(())
                }
            }
            Command::Terminate => {
                if let Some(client) = &self.client {
                    let _ = client.abort(session_id.as_str(), &project_dir).await;
                }
                let child = self.inner.lock().child.take();
                if let Some(mut child) = child {
                    let _ = child.kill().await;
                }
                self.detach().await;
                Ok(())
            }
        }
    }

    async fn detach(&self) {
        self.cancel.cancel();
        let child = self.inner.lock().child.take();
        if let Some(mut child) = child {
            let _ = child.kill().await;
        }
        self.inner.lock().listeners.clear();
    }

    fn on_event(&self, listener: EventListener) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().listeners.insert(id, listener);
        let weak = self.self_weak.clone();
        ListenerHandle::new(move || {
            if let Some(this) = weak.upgrade() {
                this.inner.lock().listeners.remove(&id);
            }
        })
    }

    fn history(&self) -> Vec<Event> {
        self.inner.lock().history.clone()
    }

    async fn refresh(&self) {
        if let Some(session_id) = self.session_id() {
            debug!("refresh requested for session {}", session_id);
        }
        let _ = self.load_history().await;
    }
}

fn send_interrupt(pid: u32) {
    #[cfg(unix)]
    {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGINT,
        );
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
