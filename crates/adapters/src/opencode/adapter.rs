// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The OpenCode per-agent façade: locates the on-disk session store,
//! enumerates and watches it, and produces [`OpenCodeDriver`] handles. See
//! SPEC_FULL.md §4.2.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentbridge_core::{
    AgentCapabilities, ApprovalCapabilities, FileOperationCapabilities, IntegrationMethod,
    ResourceCapabilities, SequenceRegistry, SessionControlCapabilities, SessionId,
    StreamingCapabilities, UserInteractionCapabilities,
};
use async_trait::async_trait;
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::contract::{
    AdapterError, AgentAdapter, AgentDataPaths, DiscoveredServer, DiscoveredSession, SessionDriver,
    WatchEvent, WatchEventKind, WatchHandle,
};
use super::driver::OpenCodeDriver;
use super::http::ServerInfo;
use super::paths;
use super::projection::project_name_from_directory;
use super::types::{MessageRecord, PartRecord, SessionRecord};

const AGENT_NAME: &str = "opencode";
const DEFAULT_CLI_PATH: &str = "opencode";

pub struct OpenCodeAdapter {
    storage_root: PathBuf,
    cli_path: String,
    seq: Arc<SequenceRegistry>,
    discovered_server: Mutex<Option<DiscoveredServer>>,
}

impl OpenCodeAdapter {
    pub fn new(seq: Arc<SequenceRegistry>) -> Self {
        Self {
            storage_root: paths::default_storage_root(),
            cli_path: DEFAULT_CLI_PATH.to_string(),
            seq,
            discovered_server: Mutex::new(None),
        }
    }

    /// Test/advanced constructor: override the storage root and CLI binary
    /// name instead of the real `$HOME`-derived defaults.
    pub fn with_paths(seq: Arc<SequenceRegistry>, storage_root: PathBuf, cli_path: impl Into<String>) -> Self {
        Self { storage_root, cli_path: cli_path.into(), seq, discovered_server: Mutex::new(None) }
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.discovered_server.lock().clone().map(|s| ServerInfo { url: s.url, version: s.version })
    }

    async fn read_message_preview(&self, session_id: &str) -> Option<String> {
        let message_dir = paths::message_dir(&self.storage_root, session_id);
        let mut entries = tokio::fs::read_dir(&message_dir).await.ok()?;
        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        for path in files {
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(msg) = serde_json::from_slice::<MessageRecord>(&bytes) else { continue };
            if msg.role != "user" {
                continue;
            }
            let part_dir = paths::part_dir(&self.storage_root, &msg.id);
            let Ok(mut part_entries) = tokio::fs::read_dir(&part_dir).await else { continue };
            let mut part_files = Vec::new();
            while let Ok(Some(entry)) = part_entries.next_entry().await {
                let p = entry.path();
                if p.extension().and_then(|e| e.to_str()) == Some("json") {
                    part_files.push(p);
                }
            }
            part_files.sort();
            for part_path in part_files {
                let Ok(bytes) = tokio::fs::read(&part_path).await else { continue };
                let Ok(part) = serde_json::from_slice::<PartRecord>(&bytes) else { continue };
                if part.kind == "text" {
                    if let Some(text) = part.text {
                        if !text.trim().is_empty() {
                            return Some(text);
                        }
                    }
                }
            }
        }
        None
    }

    async fn find_session_file(&self, session_id: &str) -> Option<(PathBuf, SessionRecord)> {
        let root = paths::sessions_root(&self.storage_root);
        let mut project_dirs = tokio::fs::read_dir(&root).await.ok()?;
        while let Ok(Some(project_entry)) = project_dirs.next_entry().await {
            if !project_entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let candidate = project_entry.path().join(format!("{session_id}.json"));
            if let Ok(bytes) = tokio::fs::read(&candidate).await {
                if let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) {
                    return Some((candidate, record));
                }
            }
        }
        None
    }
}

#[async_trait]
impl AgentAdapter for OpenCodeAdapter {
    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            agent: AGENT_NAME.to_string(),
            display: "OpenCode".to_string(),
            icon: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            integration_method: IntegrationMethod::FileWatch,
            streaming: StreamingCapabilities { messages: true, thinking: true },
            approval: ApprovalCapabilities { supported: true, preview: false },
            session_control: SessionControlCapabilities { cancel: true, pause: false, resume: false },
            planning: false,
            resources: ResourceCapabilities { cost: true, tokens: true },
            file_operations: FileOperationCapabilities { diffs: true, batched_changes: false },
            user_interaction: UserInteractionCapabilities { multimodal: true },
            sub_agents: false,
            git: false,
            web_search: false,
            multimodal: true,
            thinking: true,
            custom_event_types: Vec::new(),
        }
    }

    async fn is_installed(&self) -> bool {
        let probe = tokio::process::Command::new(&self.cli_path).arg("--version").output();
        matches!(tokio::time::timeout(Duration::from_secs(3), probe).await, Ok(Ok(output)) if output.status.success())
    }

    async fn get_version(&self) -> Option<String> {
        if let Some(server) = self.server_info() {
            if server.version.is_some() {
                return server.version;
            }
        }
        let probe = tokio::process::Command::new(&self.cli_path).arg("--version").output();
        let output = tokio::time::timeout(Duration::from_secs(3), probe).await.ok()?.ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    }

    fn data_paths(&self) -> AgentDataPaths {
        paths::default_data_paths()
    }

    fn set_discovered_server(&self, server: Option<DiscoveredServer>) {
        *self.discovered_server.lock() = server;
    }

    async fn discover_sessions(&self) -> Result<Vec<DiscoveredSession>, AdapterError> {
        let root = paths::sessions_root(&self.storage_root);
        let mut project_dirs = match tokio::fs::read_dir(&root).await {
            Ok(dir) => dir,
            Err(_) => return Ok(Vec::new()),
        };

        let mut sessions = Vec::new();
        while let Ok(Some(project_entry)) = project_dirs.next_entry().await {
            if !project_entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Ok(mut session_files) = tokio::fs::read_dir(project_entry.path()).await else { continue };
            while let Ok(Some(entry)) = session_files.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(bytes) = tokio::fs::read(&path).await else { continue };
                let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) else { continue };
                if record.time.archived.is_some() {
                    continue;
                }
                let preview = self.read_message_preview(&record.id).await;
                sessions.push(DiscoveredSession {
                    id: SessionId::new(record.id.clone()),
                    agent: AGENT_NAME.to_string(),
                    project_name: project_name_from_directory(&record.directory),
                    project_path: record.directory,
                    created_at_ms: record.time.created,
                    last_activity_ms: record.time.updated,
                    preview,
                });
            }
        }

        sessions.sort_by(|a, b| b.last_activity_ms.cmp(&a.last_activity_ms));
        Ok(sessions)
    }

    fn watch_sessions(&self, on_event: Box<dyn Fn(WatchEvent) + Send + Sync>) -> WatchHandle {
        let root = paths::sessions_root(&self.storage_root);
        let _ = std::fs::create_dir_all(&root);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Event>();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        });

        let Ok(mut watcher) = watcher else {
            return WatchHandle::new(cancel, None);
        };
        if watcher.watch(&root, RecursiveMode::Recursive).is_err() {
            warn!("sessions root not watchable: {}", root.display());
        }

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    maybe_event = rx.recv() => {
                        let Some(event) = maybe_event else { break };
                        handle_session_watch_event(event, on_event.as_ref());
                    }
                }
            }
        });

        WatchHandle::new(cancel, Some(Box::new(watcher)))
    }

    async fn attach_to_session(&self, session_id: &SessionId) -> Result<Arc<dyn SessionDriver>, AdapterError> {
        let Some((_path, record)) = self.find_session_file(session_id.as_str()).await else {
            return Err(AdapterError::SessionNotFound(session_id.as_str().to_string()));
        };

        let driver = OpenCodeDriver::new(
            Some(session_id.clone()),
            self.storage_root.clone(),
            self.capabilities(),
            self.server_info(),
            Some(record.directory),
            Arc::clone(&self.seq),
            self.cli_path.clone(),
        );
        driver.load_history().await?;
        driver.start_file_watcher();
        driver.start_sse();
        Ok(driver)
    }

    async fn start_session(
        &self,
        project_path: &str,
        prompt: &str,
    ) -> Result<Arc<dyn SessionDriver>, AdapterError> {
        let driver = OpenCodeDriver::new(
            None,
            self.storage_root.clone(),
            self.capabilities(),
            self.server_info(),
            None,
            Arc::clone(&self.seq),
            self.cli_path.clone(),
        );
        driver.start_new_session(project_path, prompt).await?;
        Ok(driver)
    }
}

fn watch_event_kind(kind: &notify::EventKind) -> Option<WatchEventKind> {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(_) => Some(WatchEventKind::Updated),
        EventKind::Remove(_) => Some(WatchEventKind::Removed),
        _ => None,
    }
}

fn handle_session_watch_event(event: notify::Event, on_event: &(dyn Fn(WatchEvent) + Send + Sync)) {
    let Some(kind) = watch_event_kind(&event.kind) else { return };
    for path in event.paths {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        on_event(WatchEvent { kind, session_id: SessionId::new(stem.to_string()), agent: AGENT_NAME.to_string() });
    }
}

