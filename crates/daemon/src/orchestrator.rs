// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon orchestrator: wires every other component together, owns
//! the canonical session table, and implements [`DaemonCallbacks`] so
//! the WebSocket server can dispatch commands back into it.
//! SPEC_FULL.md §4.4.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use agentbridge_adapters::{
    AgentAdapter, Command, DiscoveredSession, ListenerHandle, SessionDriver, WatchEvent,
    WatchEventKind,
};
use agentbridge_core::{
    AgentCapabilities, ContentBlock, Event, EventPayload, RequestId, Role, SequenceRegistry,
    SessionId, SessionStatus, ToolCallId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::rest::{
    ApprovalNotification, HeartbeatBody, LinkRequestBody, LinkStatus, RestClient, SessionProjection,
};
use crate::server::{ApprovalNotifier, AuthResult, DaemonCallbacks, WsServer};
use crate::tunnel::TunnelSupervisor;
use crate::{discovery, hooks, loader, pidfile};

/// Poll interval while waiting for a link to complete.
const LINK_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Overall timeout for `wait_for_link`.
const LINK_TIMEOUT: Duration = Duration::from_secs(600);
const ATTACH_MAX_ATTEMPTS: u32 = 3;
const ATTACH_RETRY_DELAY: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const RECENT_ACTIVITY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
const EAGER_ATTACH_WINDOW_MS: i64 = 5 * 60 * 1000;
const SESSION_NAME_MAX_CHARS: usize = 100;
const LAST_MESSAGE_MAX_CHARS: usize = 200;

/// Tags whose paired or orphaned form is stripped before a user message
/// becomes a session's display name (SPEC_FULL.md §4.4).
const STRIP_TAGS: &[&str] = &[
    "system-reminder",
    "ide_opened_file",
    "ide_selection",
    "ide_context",
    "gitStatus",
    "command-name",
    "claudeMd",
];

/// One row of the in-memory session table. Mutated only from within the
/// orchestrator (SPEC_FULL.md §5, "Shared state policy").
#[derive(Debug, Clone)]
pub struct DaemonSession {
    pub id: SessionId,
    pub agent: String,
    pub machine_id: String,
    pub project_path: String,
    pub project_name: String,
    pub status: SessionStatus,
    pub session_name: Option<String>,
    pub last_message: Option<String>,
    pub model: Option<String>,
    pub created_at_ms: i64,
    pub last_activity_ms: i64,
    pub mode: String,
}

fn session_status_wire(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Idle => "idle",
        SessionStatus::Starting => "starting",
        SessionStatus::Running => "running",
        SessionStatus::WaitingForInput => "waiting_for_input",
        SessionStatus::WaitingForApproval => "waiting_for_approval",
        SessionStatus::Completed => "completed",
        SessionStatus::Error => "error",
    }
}

fn session_snapshot(session: &DaemonSession) -> Value {
    json!({
        "sessionId": session.id.as_str(),
        "agent": session.agent,
        "machineId": session.machine_id,
        "projectPath": session.project_path,
        "projectName": session.project_name,
        "status": session_status_wire(session.status),
        "sessionName": session.session_name,
        "lastMessage": session.last_message,
        "model": session.model,
        "createdAt": ms_to_rfc3339(session.created_at_ms),
        "lastActivity": ms_to_rfc3339(session.last_activity_ms),
        "mode": session.mode,
    })
}

fn ms_to_rfc3339(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now).to_rfc3339()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Remove every occurrence of a literal tag, paired or orphaned, then
/// every `antml:`-flavored instruction tag. Orphaned means an unmatched
/// opening tag with no closing counterpart; per SPEC_FULL.md §4.4 that
/// consumes the rest of the string.
fn strip_known_tags(text: &str) -> String {
    let mut result = text.to_string();
    for tag in STRIP_TAGS {
        let escaped = regex::escape(tag);
        if let Ok(paired) = Regex::new(&format!(r"(?s)<{escaped}>.*?</{escaped}>")) {
            result = paired.replace_all(&result, "").into_owned();
        }
        if let Ok(orphan) = Regex::new(&format!(r"(?s)<{escaped}>.*$")) {
            result = orphan.replace(&result, "").into_owned();
        }
    }
    // `antml:`-prefixed tags don't have a fixed name, so the open-tag name
    // has to be discovered first. The `regex` crate has no backreferences,
    // so a matching close tag can't be found in one pass: collect every
    // distinct `antml:...` name actually present, then strip each the same
    // way the named tags above are stripped. This only touches tags whose
    // name literally starts with `antml:`; anything else (e.g. `<Button>`)
    // is left untouched.
    if let Ok(open) = Regex::new(r"<(antml:[^\s>/]*)>") {
        let mut names: Vec<String> =
            open.captures_iter(&result).map(|c| c[1].to_string()).collect();
        names.sort();
        names.dedup();
        for name in names {
            let escaped = regex::escape(&name);
            if let Ok(paired) = Regex::new(&format!(r"(?s)<{escaped}>.*?</{escaped}>")) {
                result = paired.replace_all(&result, "").into_owned();
            }
            if let Ok(orphan) = Regex::new(&format!(r"(?s)<{escaped}>.*$")) {
                result = orphan.replace(&result, "").into_owned();
            }
        }
    }
    result
}

fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

/// Derive a session's display name from a `message:complete{role:user}`
/// event's content blocks. `None` if stripping and trimming leaves
/// nothing (an orphaned-tag-only message, for instance).
fn derive_session_name(content: &[ContentBlock]) -> Option<String> {
    let concatenated: String = content.iter().filter_map(ContentBlock::as_text).collect();
    let stripped = strip_known_tags(&concatenated);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_with_ellipsis(trimmed, SESSION_NAME_MAX_CHARS))
    }
}

fn first_text(content: &[ContentBlock]) -> Option<&str> {
    content.iter().find_map(ContentBlock::as_text)
}

/// Best-effort local-network URL, used as the advertised tunnel URL when
/// `--no-tunnel` is set. Opens a UDP socket toward a public address
/// without sending any packet, purely to read back the outbound
/// interface's address — the usual portable way to find "my LAN IP"
/// without parsing `ip addr`/`ifconfig` output.
fn local_lan_url(port: u16) -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    Some(format!("http://{ip}:{port}"))
}

struct SessionTable {
    sessions: HashMap<SessionId, DaemonSession>,
    drivers: HashMap<SessionId, Arc<dyn SessionDriver>>,
    listeners: HashMap<SessionId, ListenerHandle>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self { sessions: HashMap::new(), drivers: HashMap::new(), listeners: HashMap::new() }
    }
}

/// QR-code payload returned alongside a link code, per SPEC_FULL.md §4.8.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkQrPayload {
    pub v: u8,
    pub code: String,
    pub name: String,
}

/// Outcome of a completed link wait.
pub struct LinkOutcome {
    pub machine_id: String,
    pub user_id: String,
}

/// Wires every component together and implements [`DaemonCallbacks`].
pub struct Orchestrator {
    config: Mutex<Config>,
    home_dir: PathBuf,
    no_tunnel: bool,
    seq: Arc<SequenceRegistry>,
    http: reqwest::Client,
    rest: RestClient,
    tunnel: Arc<TunnelSupervisor>,
    adapters: Vec<Arc<dyn AgentAdapter>>,
    adapters_by_name: HashMap<String, Arc<dyn AgentAdapter>>,
    capabilities: HashMap<String, AgentCapabilities>,
    table: Mutex<SessionTable>,
    ws: OnceLock<Arc<WsServer>>,
    bound_port: Mutex<Option<u16>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    watch_handles: Mutex<Vec<agentbridge_adapters::WatchHandle>>,
    self_weak: Weak<Orchestrator>,
}

impl Orchestrator {
    /// Build a new orchestrator, loading adapters synchronously. Nothing
    /// observable (network listeners, hooks, watchers) happens until
    /// [`Orchestrator::start`] runs.
    pub fn new(config: Config, home_dir: PathBuf, no_tunnel: bool) -> Arc<Self> {
        let seq = Arc::new(SequenceRegistry::new());
        let enabled = config.agents.enabled.clone();
        let plugin_dirs = config.adapters.plugin_dirs.clone();
        let adapters = loader::load_adapters(&enabled, &plugin_dirs, Arc::clone(&seq));

        let mut adapters_by_name = HashMap::new();
        let mut capabilities = HashMap::new();
        for adapter in &adapters {
            let caps = adapter.capabilities();
            adapters_by_name.insert(caps.agent.clone(), Arc::clone(adapter));
            capabilities.insert(caps.agent.clone(), caps);
        }

        let http = reqwest::Client::new();
        let rest = RestClient::new(http.clone(), config.api.url.clone());
        let tunnel = Arc::new(TunnelSupervisor::new(config.config_dir().to_path_buf()));

        Arc::new_cyclic(|weak| Self {
            config: Mutex::new(config),
            home_dir,
            no_tunnel,
            seq,
            http,
            rest,
            tunnel,
            adapters,
            adapters_by_name,
            capabilities,
            table: Mutex::new(SessionTable::default()),
            ws: OnceLock::new(),
            bound_port: Mutex::new(None),
            heartbeat_task: Mutex::new(None),
            watch_handles: Mutex::new(Vec::new()),
            self_weak: weak.clone(),
        })
    }

    #[allow(clippy::expect_used)]
    fn arc(&self) -> Arc<Self> {
        self.self_weak.upgrade().expect("orchestrator outlives its own callbacks")
    }

    fn machine_id(&self) -> String {
        self.config.lock().machine.id.clone().unwrap_or_else(|| "local".to_string())
    }

    /// Run the full startup sequence (SPEC_FULL.md §4.4). Binds the
    /// WebSocket server, writes the pidfile, starts the tunnel if
    /// configured, installs agent hooks, discovers and attaches to
    /// recently-active sessions, starts watchers, and (if linked) the
    /// heartbeat loop.
    pub async fn start(&self) -> DaemonResult<()> {
        let configured_port = self.config.lock().daemon.port;
        let addr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), configured_port);
        let ws = WsServer::start(addr, self.arc() as Arc<dyn DaemonCallbacks>).await?;
        let bound_port = ws.local_addr().port();
        *self.bound_port.lock() = Some(bound_port);

        let notifier: ApprovalNotifier = {
            let this = self.arc();
            Arc::new(move |request_id: RequestId, tool: &str, args: &Value| {
                this.on_hook_approval_requested(request_id, tool, args);
            })
        };
        ws.hook_approvals().set_notifier(notifier);

        let pidfile_path = self.config.lock().pidfile_path();
        if let Err(e) = pidfile::write(&pidfile_path, bound_port) {
            tracing::warn!(error = %e, "failed to write pidfile");
        }

        self.ws
            .set(Arc::new(ws))
            .map_err(|_| DaemonError::Other("orchestrator already started".to_string()))?;

        self.start_tunnel_if_configured().await;

        let loaded: Vec<&str> = self.adapters_by_name.keys().map(String::as_str).collect();
        tracing::info!(agents = ?loaded, "loaded adapters");
        self.install_hooks();
        self.discover_and_set_servers().await;

        self.initialize_sessions().await;
        self.start_watchers();

        if self.config.lock().machine.is_linked() {
            self.start_heartbeat();
        }

        Ok(())
    }

    /// Stop the daemon: cancel watchers, detach every driver, stop the
    /// tunnel, close the WebSocket server, remove the pidfile. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.heartbeat_task.lock().take() {
            handle.abort();
        }
        self.watch_handles.lock().clear();

        let session_ids: Vec<SessionId> = self.table.lock().drivers.keys().cloned().collect();
        for session_id in session_ids {
            self.detach_session(session_id).await;
        }

        self.tunnel.stop();

        let pidfile_path = self.config.lock().pidfile_path();
        pidfile::remove(&pidfile_path);
    }

    fn install_hooks(&self) {
        let config_dir = self.config.lock().config_dir().to_path_buf();
        hooks::install_claude_code_hook(&config_dir, &self.home_dir);
        hooks::install_opencode_hook(&self.home_dir);
    }

    async fn discover_and_set_servers(&self) {
        let server = discovery::discover(&self.http).await;
        for adapter in &self.adapters {
            adapter.set_discovered_server(server.clone());
        }
    }

    async fn start_tunnel_if_configured(&self) {
        if self.no_tunnel {
            return;
        }
        let token = self.config.lock().machine.tunnel_token.clone();
        let Some(token) = token else { return };
        if let Err(e) = self.tunnel.ensure_installed().await {
            tracing::warn!(error = %e, "tunnel binary not available, continuing without a tunnel");
            return;
        }
        if let Err(e) = self.tunnel.start_with_token(&token).await {
            tracing::warn!(error = %e, "failed to start named tunnel, continuing without one");
        }
    }

    fn tunnel_url_for_heartbeat(&self, config: &Config) -> Option<String> {
        if self.no_tunnel {
            let port = self.bound_port.lock().unwrap_or(config.daemon.port);
            return local_lan_url(port);
        }
        self.tunnel.get_tunnel_url().or_else(|| config.machine.tunnel_url.clone())
    }

    async fn initialize_sessions(&self) {
        let now = now_ms();
        for adapter in self.adapters.clone() {
            let discovered = match adapter.discover_sessions().await {
                Ok(sessions) => sessions,
                Err(e) => {
                    tracing::warn!(agent = %adapter.capabilities().agent, error = %e, "discover_sessions failed");
                    continue;
                }
            };
            for found in discovered {
                if now - found.last_activity_ms > RECENT_ACTIVITY_WINDOW_MS {
                    continue;
                }
                let eager = now - found.last_activity_ms <= EAGER_ATTACH_WINDOW_MS;
                let status = if eager { SessionStatus::Running } else { SessionStatus::Idle };
                self.insert_discovered_session(&found, status);
                if eager {
                    self.attach_with_retry(found.id.clone(), Arc::clone(&adapter));
                }
            }
        }
    }

    fn insert_discovered_session(&self, found: &DiscoveredSession, status: SessionStatus) {
        let session = DaemonSession {
            id: found.id.clone(),
            agent: found.agent.clone(),
            machine_id: self.machine_id(),
            project_path: found.project_path.clone(),
            project_name: found.project_name.clone(),
            status,
            session_name: None,
            last_message: None,
            model: None,
            created_at_ms: found.created_at_ms,
            last_activity_ms: found.last_activity_ms,
            mode: "default".to_string(),
        };
        self.table.lock().sessions.insert(found.id.clone(), session);
    }

    fn start_watchers(&self) {
        for adapter in self.adapters.clone() {
            let this = self.arc();
            let adapter_for_callback = Arc::clone(&adapter);
            let handle = adapter.watch_sessions(Box::new(move |event| {
                let this = Arc::clone(&this);
                let adapter = Arc::clone(&adapter_for_callback);
                tokio::spawn(async move { this.handle_watch_event(event, adapter).await });
            }));
            self.watch_handles.lock().push(handle);
        }
    }

    async fn handle_watch_event(&self, event: WatchEvent, adapter: Arc<dyn AgentAdapter>) {
        match event.kind {
            WatchEventKind::Created => self.handle_session_created(event.session_id, adapter).await,
            WatchEventKind::Removed => self.handle_session_removed(event.session_id).await,
            WatchEventKind::Updated => self.handle_session_updated(event.session_id, adapter).await,
        }
    }

    async fn handle_session_created(&self, session_id: SessionId, adapter: Arc<dyn AgentAdapter>) {
        if self.table.lock().sessions.contains_key(&session_id) {
            return;
        }
        let Ok(discovered) = adapter.discover_sessions().await else { return };
        let Some(found) = discovered.into_iter().find(|d| d.id == session_id) else { return };
        self.insert_discovered_session(&found, SessionStatus::Running);
        self.broadcast_sessions_snapshot();
        self.attach_with_retry(found.id, adapter);
    }

    async fn handle_session_removed(&self, session_id: SessionId) {
        self.table.lock().sessions.remove(&session_id);
        self.detach_session(session_id).await;
        self.broadcast_sessions_snapshot();
    }

    async fn handle_session_updated(&self, session_id: SessionId, adapter: Arc<dyn AgentAdapter>) {
        let is_unknown = {
            let mut table = self.table.lock();
            match table.sessions.get_mut(&session_id) {
                Some(session) => {
                    session.last_activity_ms = now_ms();
                    session.project_name == "Unknown"
                }
                None => return,
            }
        };

        if is_unknown {
            if let Ok(discovered) = adapter.discover_sessions().await {
                if let Some(found) = discovered.into_iter().find(|d| d.id == session_id) {
                    if found.project_name != "Unknown" {
                        let mut table = self.table.lock();
                        if let Some(session) = table.sessions.get_mut(&session_id) {
                            session.project_name = found.project_name;
                            session.project_path = found.project_path;
                        }
                    }
                }
            }
        }

        let driver = self.table.lock().drivers.get(&session_id).cloned();
        if let Some(driver) = driver {
            driver.refresh().await;
            return;
        }

        let should_attach = {
            let mut table = self.table.lock();
            match table.sessions.get_mut(&session_id) {
                Some(session) if session.status == SessionStatus::Idle => {
                    session.status = SessionStatus::Running;
                    true
                }
                _ => false,
            }
        };
        if should_attach {
            self.attach_with_retry(session_id, adapter);
        }
    }

    fn attach_with_retry(&self, session_id: SessionId, adapter: Arc<dyn AgentAdapter>) {
        let this = self.arc();
        tokio::spawn(async move {
            for attempt in 1..=ATTACH_MAX_ATTEMPTS {
                match this.attach_driver(session_id.clone(), Arc::clone(&adapter)).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, attempt, error = %e, "session attach failed");
                        if attempt < ATTACH_MAX_ATTEMPTS {
                            tokio::time::sleep(ATTACH_RETRY_DELAY).await;
                        }
                    }
                }
            }
            tracing::warn!(session_id = %session_id, "abandoning session attach after max attempts");
        });
    }

    async fn attach_driver(
        &self,
        session_id: SessionId,
        adapter: Arc<dyn AgentAdapter>,
    ) -> Result<(), agentbridge_adapters::AdapterError> {
        let driver = adapter.attach_to_session(&session_id).await?;
        self.wire_driver(session_id, driver).await;
        Ok(())
    }

    /// Replay a just-attached driver's already-loaded history through the
    /// canonical event handler, then subscribe to future events and
    /// register the driver so commands and detach can find it.
    async fn wire_driver(&self, session_id: SessionId, driver: Arc<dyn SessionDriver>) {
        for event in driver.history() {
            self.handle_canonical_event(event);
        }

        let this = self.arc();
        let listener = driver.on_event(Box::new(move |event| {
            this.handle_canonical_event(event);
        }));

        let mut table = self.table.lock();
        table.drivers.insert(session_id.clone(), Arc::clone(&driver));
        table.listeners.insert(session_id, listener);
    }

    async fn detach_session(&self, session_id: SessionId) {
        let driver = {
            let mut table = self.table.lock();
            table.listeners.remove(&session_id);
            table.drivers.remove(&session_id)
        };
        if let Some(driver) = driver {
            driver.detach().await;
        }
    }

    fn broadcast_sessions_snapshot(&self) {
        if let Some(ws) = self.ws.get() {
            ws.broadcast_sessions_list(self.sessions_snapshot_value());
        }
    }

    fn sessions_snapshot_value(&self) -> Value {
        let table = self.table.lock();
        let mut sessions: Vec<&DaemonSession> = table.sessions.values().collect();
        sessions.sort_by(|a, b| b.last_activity_ms.cmp(&a.last_activity_ms));
        Value::Array(sessions.into_iter().map(session_snapshot).collect())
    }

    /// Apply one canonical event to the session table and fan it out.
    /// Called both for replayed history and for live events.
    fn handle_canonical_event(&self, event: Event) {
        let session_id = event.session_id.clone();
        {
            let mut table = self.table.lock();
            if let Some(session) = table.sessions.get_mut(&session_id) {
                apply_event_to_session(session, &event.payload);
            }
        }

        if let Some(ws) = self.ws.get() {
            ws.broadcast_acp_event(&event);
        }

        match &event.payload {
            EventPayload::SessionCompleted { .. } | EventPayload::SessionErrorEvent { .. } => {
                let this = self.arc();
                let session_id = session_id.clone();
                tokio::spawn(async move { this.detach_session(session_id).await });
            }
            EventPayload::ApprovalRequested { .. } => {
                self.maybe_forward_approval(event);
            }
            _ => {}
        }
    }

    fn maybe_forward_approval(&self, event: Event) {
        let EventPayload::ApprovalRequested { request_id, tool_call_id, tool_name, description, risk_level, .. } =
            &event.payload
        else {
            return;
        };
        let (linked, forward, machine_id, api_secret) = {
            let config = self.config.lock();
            (
                config.machine.is_linked(),
                config.approvals.forward_to_remote,
                self.machine_id(),
                config.machine.api_secret.clone(),
            )
        };
        if !linked || !forward {
            return;
        }
        let body = ApprovalNotification {
            machine_id,
            session_id: event.session_id.to_string(),
            request_id: request_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.clone(),
            description: description.clone(),
            risk_level: serde_json::to_value(risk_level)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "medium".to_string()),
        };
        let rest = self.rest.clone();
        tokio::spawn(async move {
            if let Err(e) = rest.forward_approval(api_secret.as_deref(), &body).await {
                tracing::warn!(error = %e, "failed to forward approval to remote API");
            }
        });
    }

    /// Called whenever a hook script registers a pending approval
    /// outside any attached driver. Surfaced as an `approval:requested`
    /// canonical event under a synthetic session id (the hook script
    /// doesn't carry one) and forwarded the same way as a driver's own
    /// approval events.
    fn on_hook_approval_requested(&self, request_id: RequestId, tool: &str, args: &Value) {
        let session_id = SessionId::new("hook");
        let risk_level = agentbridge_core::assess_risk(tool, args, None);
        let description = agentbridge_core::describe_tool_call(tool, args);
        let event = self.seq.create_event(
            session_id,
            now_iso(),
            EventPayload::ApprovalRequested {
                request_id,
                tool_call_id: ToolCallId::new(uuid::Uuid::new_v4().to_string()),
                tool_name: tool.to_string(),
                tool_input: args.clone(),
                description,
                risk_level,
                expires_at: (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339(),
                preview: agentbridge_core::ApprovalPreview::default(),
            },
        );
        if let Some(ws) = self.ws.get() {
            ws.broadcast_acp_event(&event);
        }
        self.maybe_forward_approval(event);
    }

    fn start_heartbeat(&self) {
        let this = self.arc();
        let handle = tokio::spawn(async move {
            this.send_heartbeat().await;
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                this.send_heartbeat().await;
            }
        });
        *self.heartbeat_task.lock() = Some(handle);
    }

    async fn send_heartbeat(&self) {
        let (machine_id, api_secret, tunnel_url) = {
            let config = self.config.lock();
            let Some(machine_id) = config.machine.id.clone() else { return };
            let tunnel_url = self.tunnel_url_for_heartbeat(&config);
            (machine_id, config.machine.api_secret.clone(), tunnel_url)
        };
        let agents_detected: Vec<String> = self.adapters_by_name.keys().cloned().collect();
        let body = HeartbeatBody { tunnel_url, agents_detected, sessions: self.heartbeat_session_projections() };
        if let Err(e) = self.rest.heartbeat(&machine_id, api_secret.as_deref(), &body).await {
            tracing::warn!(error = %e, "heartbeat failed");
        }
    }

    fn heartbeat_session_projections(&self) -> Vec<SessionProjection> {
        self.table
            .lock()
            .sessions
            .values()
            .map(|session| SessionProjection {
                id: session.id.to_string(),
                agent: session.agent.clone(),
                project_path: session.project_path.clone(),
                project_name: session.project_name.clone(),
                status: session_status_wire(session.status).to_string(),
                last_message: session.last_message.clone(),
                last_activity_at: ms_to_rfc3339(session.last_activity_ms),
                started_at: ms_to_rfc3339(session.created_at_ms),
            })
            .collect()
    }

    /// Start a fresh link request, returning the code and its QR payload.
    pub async fn create_link_request(&self) -> DaemonResult<(String, LinkQrPayload)> {
        let machine_name = hostname();
        let agents_detected: Vec<String> = self.adapters_by_name.keys().cloned().collect();
        let body = LinkRequestBody {
            machine_name: machine_name.clone(),
            os: std::env::var("HOST_OS").unwrap_or_else(|_| std::env::consts::OS.to_string()),
            arch: std::env::var("HOST_ARCH").unwrap_or_else(|_| std::env::consts::ARCH.to_string()),
            agents_detected,
        };
        let response = self.rest.create_link_request(&body).await?;
        let qr = LinkQrPayload { v: 1, code: response.code.clone(), name: machine_name };
        Ok((response.code, qr))
    }

    /// Poll link status every [`LINK_POLL_INTERVAL`] until linked or
    /// [`LINK_TIMEOUT`] elapses, invoking `on_poll` after every attempt.
    /// On success, persists the machine fields, starts the heartbeat, and
    /// (unless `no_tunnel`) starts the named tunnel.
    pub async fn wait_for_link(&self, code: &str, on_poll: impl Fn()) -> DaemonResult<LinkOutcome> {
        let deadline = tokio::time::Instant::now() + LINK_TIMEOUT;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(DaemonError::LinkExpired);
            }
            match self.rest.link_status(code).await {
                Ok(LinkStatus::Linked { linked: true, machine_id, tunnel_token, tunnel_url, user_id, api_secret }) => {
                    {
                        let mut config = self.config.lock();
                        config.apply_link(
                            machine_id.clone(),
                            user_id.clone(),
                            api_secret,
                            tunnel_token.clone(),
                            tunnel_url,
                        )?;
                    }
                    self.start_heartbeat();
                    if !self.no_tunnel {
                        if let Some(token) = tunnel_token {
                            if let Err(e) = self.tunnel.ensure_installed().await {
                                tracing::warn!(error = %e, "tunnel binary not available after link");
                            } else if let Err(e) = self.tunnel.start_with_token(&token).await {
                                tracing::warn!(error = %e, "failed to start named tunnel after link");
                            }
                        }
                    }
                    return Ok(LinkOutcome { machine_id, user_id });
                }
                Ok(_) => {}
                Err(DaemonError::LinkRequestGone) => return Err(DaemonError::LinkRequestGone),
                Err(e) => tracing::debug!(error = %e, "link status poll failed, retrying"),
            }
            on_poll();
            tokio::time::sleep(LINK_POLL_INTERVAL).await;
        }
    }
}

/// Best-effort machine hostname for the link-request body.
fn hostname() -> String {
    std::env::var("HOST_NAME")
        .ok()
        .or_else(|| hostname_from_os())
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(unix)]
fn hostname_from_os() -> Option<String> {
    nix::unistd::gethostname().ok().and_then(|s| s.into_string().ok())
}

#[cfg(not(unix))]
fn hostname_from_os() -> Option<String> {
    None
}

/// Apply one canonical event's effect on a session row, per the table in
/// SPEC_FULL.md §4.4. Shared between live events and history replay.
fn apply_event_to_session(session: &mut DaemonSession, payload: &EventPayload) {
    match payload {
        EventPayload::SessionStatusChanged { to, .. } => {
            session.status = *to;
            session.last_activity_ms = now_ms();
        }
        EventPayload::SessionCompleted { .. } => {
            session.status = SessionStatus::Completed;
        }
        EventPayload::SessionErrorEvent { .. } => {
            session.status = SessionStatus::Error;
        }
        EventPayload::MessageComplete { role: Role::User, content, .. } => {
            if session.session_name.is_none() {
                session.session_name = derive_session_name(content);
            }
        }
        EventPayload::MessageComplete { role: Role::Assistant, content, .. } => {
            if let Some(text) = first_text(content) {
                session.last_message = Some(truncate_with_ellipsis(text, LAST_MESSAGE_MAX_CHARS));
            }
        }
        EventPayload::MessageDelta { .. } => {
            session.last_activity_ms = now_ms();
        }
        EventPayload::EnvironmentInfo { context } => {
            if let Some(model) = &context.model {
                session.model = Some(model.id.clone());
            }
        }
        _ => {}
    }
}

#[async_trait]
impl DaemonCallbacks for Orchestrator {
    async fn on_auth(&self, token: &str) -> AuthResult {
        let (linked, machine_id) = {
            let config = self.config.lock();
            (config.machine.is_linked(), config.machine.id.clone().unwrap_or_default())
        };
        if !linked {
            return AuthResult { valid: true, user_id: Some("local-user".to_string()) };
        }
        match self.rest.validate_token(token, &machine_id).await {
            Ok(response) => AuthResult { valid: response.valid, user_id: response.user_id },
            Err(e) => {
                tracing::warn!(error = %e, "token validation request failed, falling back to local-user");
                AuthResult { valid: true, user_id: Some("local-user".to_string()) }
            }
        }
    }

    async fn on_command(&self, session_id: SessionId, command: Command) -> Result<(), String> {
        let driver = self.table.lock().drivers.get(&session_id).cloned();
        let driver = match driver {
            Some(driver) => driver,
            None => {
                let agent = {
                    let table = self.table.lock();
                    table.sessions.get(&session_id).map(|s| s.agent.clone())
                };
                let Some(agent) = agent else { return Err("Session not found".to_string()) };
                let Some(adapter) = self.adapters_by_name.get(&agent).cloned() else {
                    return Err("Session not found".to_string());
                };
                let driver = adapter
                    .attach_to_session(&session_id)
                    .await
                    .map_err(|e| e.to_string())?;
                self.wire_driver(session_id.clone(), Arc::clone(&driver)).await;
                driver
            }
        };
        driver.execute(command).await.map_err(|e| e.to_string())
    }

    async fn on_terminate_session(&self, session_id: SessionId) -> Result<(), String> {
        self.on_command(session_id.clone(), Command::Terminate).await?;
        if let Some(session) = self.table.lock().sessions.get_mut(&session_id) {
            session.status = SessionStatus::Completed;
        }
        self.detach_session(session_id).await;
        Ok(())
    }

    async fn on_start_session(
        &self,
        agent: String,
        project_path: String,
        prompt: String,
    ) -> Result<SessionId, String> {
        let adapter = self
            .adapters_by_name
            .get(&agent)
            .cloned()
            .ok_or_else(|| format!("agent not found: {agent}"))?;
        let driver = adapter.start_session(&project_path, &prompt).await.map_err(|e| e.to_string())?;
        let session_id = driver
            .session_id()
            .ok_or_else(|| "adapter did not assign a session id".to_string())?;

        let project_name = project_path
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(&project_path)
            .to_string();
        let now = now_ms();
        let session = DaemonSession {
            id: session_id.clone(),
            agent,
            machine_id: self.machine_id(),
            project_path,
            project_name,
            status: SessionStatus::Running,
            session_name: None,
            last_message: None,
            model: None,
            created_at_ms: now,
            last_activity_ms: now,
            mode: "default".to_string(),
        };
        self.table.lock().sessions.insert(session_id.clone(), session);
        self.wire_driver(session_id.clone(), driver).await;
        self.broadcast_sessions_snapshot();
        Ok(session_id)
    }

    async fn get_sessions(&self) -> Value {
        self.sessions_snapshot_value()
    }

    async fn get_capabilities(&self) -> Value {
        json!(self.capabilities)
    }

    async fn get_session_history(&self, session_id: SessionId) -> Result<Vec<Event>, String> {
        let driver = self.table.lock().drivers.get(&session_id).cloned();
        if let Some(driver) = driver {
            return Ok(driver.history());
        }
        let agent = {
            let table = self.table.lock();
            table.sessions.get(&session_id).map(|s| s.agent.clone())
        };
        let Some(agent) = agent else { return Err("Session not found".to_string()) };
        let Some(adapter) = self.adapters_by_name.get(&agent).cloned() else {
            return Err("Session not found".to_string());
        };
        let driver = adapter.attach_to_session(&session_id).await.map_err(|e| e.to_string())?;
        let history = driver.history();
        self.wire_driver(session_id, Arc::clone(&driver)).await;
        Ok(history)
    }

    async fn on_client_authenticated(&self) {
        if self.config.lock().machine.is_linked() {
            let this = self.arc();
            tokio::spawn(async move { this.send_heartbeat().await });
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
