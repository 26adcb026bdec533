// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed, serde-backed configuration record. Loaded from a TOML file at
//! `<config_dir>/config.toml`, overridden by a handful of environment
//! variables (SPEC_FULL.md §6). Out of scope for the distilled spec, but
//! every other component reads through this record rather than the
//! environment directly, the way the teacher daemon centralizes env
//! access in one module (see the former `env.rs`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

fn default_port() -> u16 {
    9876
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TunnelSection {
    pub no_tunnel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsSection {
    /// Agent kinds enabled by name; empty means "every loaded adapter".
    pub enabled: Vec<String>,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self { enabled: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdaptersSection {
    /// Additional directories to search for plugin adapters, beyond the
    /// standard install locations.
    pub plugin_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSection {
    pub url: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self { url: "https://api.agentap.dev".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalSection {
    pub url: String,
}

impl Default for PortalSection {
    fn default() -> Self {
        Self { url: "https://agentap.dev".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MachineSection {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub api_secret: Option<String>,
    pub tunnel_token: Option<String>,
    pub tunnel_url: Option<String>,
}

impl MachineSection {
    pub fn is_linked(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApprovalsSection {
    #[serde(default = "default_true")]
    pub forward_to_remote: bool,
}

impl Default for ApprovalsSection {
    fn default() -> Self {
        Self { forward_to_remote: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonSection,
    pub tunnel: TunnelSection,
    pub agents: AgentsSection,
    pub adapters: AdaptersSection,
    pub api: ApiSection,
    pub portal: PortalSection,
    pub machine: MachineSection,
    pub approvals: ApprovalsSection,

    /// Directory this record was loaded from/will be saved to. Not
    /// serialized; populated by `load`/`load_or_default`.
    #[serde(skip)]
    config_dir: PathBuf,
}

impl Config {
    /// `<home>/.config/agentap` on Linux/macOS, overridable for tests.
    pub fn default_config_dir() -> DaemonResult<PathBuf> {
        if let Ok(dir) = std::env::var("AGENTAP_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| DaemonError::Config("no config directory for this platform".into()))?;
        Ok(base.join("agentap"))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Re-point this record at a config directory. Used by callers that
    /// rebuild a `Config` from a serialized form (e.g. `agentbridge
    /// config set`, which round-trips through a JSON document that
    /// doesn't carry the skipped `config_dir` field).
    pub fn set_config_dir(&mut self, dir: impl Into<PathBuf>) {
        self.config_dir = dir.into();
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn pidfile_path(&self) -> PathBuf {
        self.config_dir.join("daemon.pid")
    }

    /// Load from `<dir>/config.toml`, applying environment overrides on
    /// top. A missing or corrupt file logs and falls back to defaults
    /// (SPEC_FULL.md §7, "Configuration corrupt").
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join("config.toml");
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Config>(&contents).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "corrupt config, using defaults");
                Config::default()
            }),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, path = %path.display(), "could not read config, using defaults");
                }
                Config::default()
            }
        };
        config.config_dir = dir;
        config.apply_env_overrides();
        config
    }

    pub fn load_default() -> DaemonResult<Self> {
        Ok(Self::load(Self::default_config_dir()?))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("API_URL") {
            self.api.url = url;
        }
        if let Ok(url) = std::env::var("PORTAL_URL") {
            self.portal.url = url;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.daemon.port = port;
            }
        }
    }

    /// Persist to `<config_dir>/config.toml`, mode 0600, directory 0700.
    pub fn save(&self) -> DaemonResult<()> {
        create_secure_dir(&self.config_dir)?;
        let body = toml::to_string_pretty(self)
            .map_err(|e| DaemonError::Config(format!("failed to serialize config: {e}")))?;
        write_secure_file(&self.config_path(), body.as_bytes())?;
        Ok(())
    }

    /// Write the linked-machine fields and persist. Called at the end of
    /// the link flow (SPEC_FULL.md §4.8).
    pub fn apply_link(
        &mut self,
        id: String,
        user_id: String,
        api_secret: Option<String>,
        tunnel_token: Option<String>,
        tunnel_url: Option<String>,
    ) -> DaemonResult<()> {
        self.machine.id = Some(id);
        self.machine.user_id = Some(user_id);
        if api_secret.is_some() {
            self.machine.api_secret = api_secret;
        }
        if tunnel_token.is_some() {
            self.machine.tunnel_token = tunnel_token;
        }
        if tunnel_url.is_some() {
            self.machine.tunnel_url = tunnel_url;
        }
        self.save()
    }
}

#[cfg(unix)]
fn create_secure_dir(dir: &Path) -> DaemonResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn create_secure_dir(dir: &Path) -> DaemonResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(unix)]
fn write_secure_file(path: &Path, contents: &[u8]) -> DaemonResult<()> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_secure_file(path: &Path, contents: &[u8]) -> DaemonResult<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
