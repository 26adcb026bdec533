// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter plugin loader: discovers installed adapters — the built-in
//! OpenCode adapter plus anything found under the standard install
//! locations or a user plugin directory — validates their manifest, and
//! filters by `config.agents.enabled`. SPEC_FULL.md §2, §4.4 step 5.
//!
//! Only the OpenCode adapter ships with this daemon (the Claude, Codex,
//! and Aider adapters are out of scope per SPEC_FULL.md §1); the plugin
//! scan below is still real so a third-party adapter dropped into a
//! plugin directory is picked up without a code change here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentbridge_adapters::AgentAdapter;
use agentbridge_adapters::opencode::OpenCodeAdapter;
use agentbridge_core::SequenceRegistry;
use serde::Deserialize;

/// A plugin adapter's manifest: `<plugin_dir>/<name>/manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterManifest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn standard_plugin_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(data_dir) = dirs::data_dir() {
        dirs.push(data_dir.join("agentap").join("adapters"));
    }
    dirs.push(PathBuf::from("/usr/local/share/agentap/adapters"));
    dirs
}

/// Read and validate every `manifest.json` under `dir`'s immediate
/// subdirectories. Unreadable or malformed manifests are skipped
/// silently, the same tolerance the adapters themselves apply to
/// malformed session files (SPEC_FULL.md §7, "Transient I/O").
fn scan_plugin_dir(dir: &Path) -> Vec<AdapterManifest> {
    let Ok(entries) = std::fs::read_dir(dir) else { return Vec::new() };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let manifest_path = entry.path().join("manifest.json");
            let contents = std::fs::read_to_string(manifest_path).ok()?;
            serde_json::from_str(&contents).ok()
        })
        .collect()
}

/// Every plugin manifest found across the standard locations plus any
/// extra directories configured under `adapters.plugin_dirs`.
pub fn discover_plugin_manifests(extra_dirs: &[PathBuf]) -> Vec<AdapterManifest> {
    standard_plugin_dirs()
        .iter()
        .chain(extra_dirs)
        .flat_map(|dir| scan_plugin_dir(dir))
        .collect()
}

/// Is `name` enabled given the config's allowlist? An empty allowlist
/// means every loaded adapter is enabled.
pub fn is_enabled(enabled: &[String], name: &str) -> bool {
    enabled.is_empty() || enabled.iter().any(|n| n == name)
}

/// Build the list of loaded adapters, already filtered by
/// `config.agents.enabled`. The built-in OpenCode adapter is always a
/// candidate; discovered plugin manifests are validated but, absent a
/// concrete loader for a third-party binary protocol, only logged.
pub fn load_adapters(
    enabled: &[String],
    extra_plugin_dirs: &[PathBuf],
    seq: Arc<SequenceRegistry>,
) -> Vec<Arc<dyn AgentAdapter>> {
    let mut loaded: Vec<Arc<dyn AgentAdapter>> = Vec::new();

    if is_enabled(enabled, "opencode") {
        loaded.push(Arc::new(OpenCodeAdapter::new(seq)));
    }

    for manifest in discover_plugin_manifests(extra_plugin_dirs) {
        if is_enabled(enabled, &manifest.name) {
            tracing::info!(
                adapter = %manifest.name,
                "found plugin adapter manifest (no loader registered for its protocol)"
            );
        }
    }

    loaded
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod loader_tests;
