// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse-tunnel supervisor: ensures the `cloudflared` binary is
//! installed, runs it as a child process, and exposes the resulting
//! public URL. SPEC_FULL.md §4.7. Owns at most one tunnel child at a
//! time; `start()`/`start_with_token()` fail fast if one is already
//! running.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use crate::error::{DaemonError, DaemonResult};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum TunnelEvent {
    Connected { tunnel_url: String, tunnel_id: String },
    Disconnected,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TunnelMode {
    Quick(String),
    Named,
}

/// Marker URL returned by `get_tunnel_url()` for named tunnels: the real
/// hostname lives in the linked machine's config, populated by the
/// remote API during the link flow, not observable from the child's
/// output.
pub const NAMED_TUNNEL_MARKER: &str = "named-tunnel";

pub struct TunnelSupervisor {
    binary: String,
    bin_dir: PathBuf,
    child: Mutex<Option<Child>>,
    mode: Mutex<Option<TunnelMode>>,
    events: broadcast::Sender<TunnelEvent>,
}

impl TunnelSupervisor {
    pub fn new(config_dir: PathBuf) -> Self {
        Self::with_binary("cloudflared".to_string(), config_dir)
    }

    /// Test/advanced constructor: override the binary invoked as the
    /// tunnel process (stands in for `cloudflared` in tests).
    pub fn with_binary(binary: String, config_dir: PathBuf) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            binary,
            bin_dir: config_dir.join("bin"),
            child: Mutex::new(None),
            mode: Mutex::new(None),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    fn is_running(&self) -> bool {
        self.child.lock().is_some()
    }

    /// Best-effort `<binary> --version` probe; installs into
    /// `<config_dir>/bin` if missing.
    pub async fn ensure_installed(&self) -> DaemonResult<()> {
        if which(&self.binary).is_some() {
            return Ok(());
        }
        if self.bin_dir.join(&self.binary).exists() {
            return Ok(());
        }
        self.install().await
    }

    async fn install(&self) -> DaemonResult<()> {
        #[cfg(target_os = "macos")]
        {
            if try_homebrew_install(&self.binary).await {
                return Ok(());
            }
        }
        let url = download_url_for_platform()
            .ok_or_else(|| DaemonError::TunnelUnsupportedPlatform(platform_label()))?;
        std::fs::create_dir_all(&self.bin_dir)?;
        let dest = self.bin_dir.join(&self.binary);
        download_to(&url, &dest).await?;
        set_executable(&dest)?;
        Ok(())
    }

    fn binary_path(&self) -> PathBuf {
        if which(&self.binary).is_some() {
            PathBuf::from(&self.binary)
        } else {
            self.bin_dir.join(&self.binary)
        }
    }

    /// Start an anonymous quick tunnel for `local_port`. Resolves once the
    /// first `https://…trycloudflare.com` URL is observed on stdout or
    /// stderr, or fails with [`DaemonError::TunnelTimeout`] after 30s.
    /// Reconnects (capped) in the background if the child later exits
    /// non-zero.
    pub async fn start(self: &Arc<Self>, local_port: u16) -> DaemonResult<(String, String)> {
        if self.is_running() {
            return Err(DaemonError::TunnelAlreadyRunning);
        }
        let (tunnel_url, tunnel_id, child) = self.spawn_quick(local_port).await?;
        *self.mode.lock() = Some(TunnelMode::Quick(tunnel_url.clone()));
        *self.child.lock() = Some(child);
        let _ = self.events.send(TunnelEvent::Connected {
            tunnel_url: tunnel_url.clone(),
            tunnel_id: tunnel_id.clone(),
        });
        self.watch(0, move |sup| {
            let sup = Arc::clone(sup);
            Box::pin(async move { sup.spawn_quick(local_port).await })
        });
        Ok((tunnel_url, tunnel_id))
    }

    async fn spawn_quick(&self, local_port: u16) -> DaemonResult<(String, String, Child)> {
        let mut command = Command::new(self.binary_path());
        command
            .args(["tunnel", "--url", &format!("http://localhost:{local_port}")])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        spawn_and_wait_for(command, extract_quick_tunnel_url).await
    }

    /// Start a named tunnel bound to a previously-issued token. Resolves
    /// once `Registered tunnel connection` appears in stderr.
    pub async fn start_with_token(self: &Arc<Self>, token: &str) -> DaemonResult<()> {
        if self.is_running() {
            return Err(DaemonError::TunnelAlreadyRunning);
        }
        let token = token.to_string();
        let (_, tunnel_id, child) = self.spawn_named(&token).await?;
        *self.mode.lock() = Some(TunnelMode::Named);
        *self.child.lock() = Some(child);
        let _ = self.events.send(TunnelEvent::Connected {
            tunnel_url: NAMED_TUNNEL_MARKER.to_string(),
            tunnel_id,
        });
        self.watch(0, move |sup| {
            let sup = Arc::clone(sup);
            let token = token.clone();
            Box::pin(async move { sup.spawn_named(&token).await })
        });
        Ok(())
    }

    async fn spawn_named(&self, token: &str) -> DaemonResult<(String, String, Child)> {
        let mut command = Command::new(self.binary_path());
        command
            .args(["tunnel", "--no-autoupdate", "run", "--token", token])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        spawn_and_wait_for(command, |line| {
            detects_named_tunnel_registration(line).then(|| NAMED_TUNNEL_MARKER.to_string())
        })
        .await
    }

    pub fn get_tunnel_url(&self) -> Option<String> {
        match self.mode.lock().clone()? {
            TunnelMode::Quick(url) => Some(url),
            TunnelMode::Named => Some(NAMED_TUNNEL_MARKER.to_string()),
        }
    }

    /// Terminate the child and clear all state. Idempotent.
    pub fn stop(&self) {
        if let Some(mut child) = self.child.lock().take() {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }
            #[cfg(not(unix))]
            let _ = child.start_kill();
        }
        *self.mode.lock() = None;
    }

    /// Await the current child's exit, emit `Disconnected`/`Error`, and
    /// on a non-zero exit respawn via `respawn` up to
    /// `MAX_RECONNECT_ATTEMPTS` times. `attempt` is the retry count so far.
    fn watch(
        self: &Arc<Self>,
        attempt: u32,
        respawn: impl Fn(
                &Arc<Self>,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = DaemonResult<(String, String, Child)>> + Send>,
            > + Send
            + Sync
            + 'static,
    ) {
        let sup = Arc::clone(self);
        tokio::spawn(async move {
            let mut child = match sup.child.lock().take() {
                Some(c) => c,
                None => return,
            };
            let status = child.wait().await.ok();

            match status {
                Some(status) if status.success() => {
                    let _ = sup.events.send(TunnelEvent::Disconnected);
                }
                Some(status) => {
                    tracing::warn!(%status, attempt, "tunnel process exited non-zero");
                    let _ = sup.events.send(TunnelEvent::Error(format!("exit status {status}")));
                    if attempt < MAX_RECONNECT_ATTEMPTS {
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        match respawn(&sup).await {
                            Ok((url, id, child)) => {
                                *sup.child.lock() = Some(child);
                                let _ = sup.events.send(TunnelEvent::Connected {
                                    tunnel_url: url,
                                    tunnel_id: id,
                                });
                                sup.watch(attempt + 1, respawn);
                            }
                            Err(e) => {
                                let _ = sup.events.send(TunnelEvent::Error(e.to_string()));
                            }
                        }
                    }
                }
                None => {}
            }
        });
    }
}

/// Spawn `command`, read stdout and stderr concurrently line-by-line, and
/// resolve as soon as `extract` returns `Some` for a line from either
/// stream. Fails with [`DaemonError::TunnelTimeout`] after 30s, killing
/// the child.
async fn spawn_and_wait_for(
    mut command: Command,
    extract: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
) -> DaemonResult<(String, String, Child)> {
    let mut child = command.spawn().map_err(|e| DaemonError::Other(format!("failed to spawn tunnel: {e}")))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let extract = Arc::new(extract);
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);

    for stream in [stdout.map(EitherRead::Out), stderr.map(EitherRead::Err)].into_iter().flatten() {
        let tx = tx.clone();
        let extract = Arc::clone(&extract);
        tokio::spawn(async move {
            let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> = match stream {
                EitherRead::Out(s) => Box::new(s),
                EitherRead::Err(s) => Box::new(s),
            };
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(found) = extract(&line) {
                    let _ = tx.send(found).await;
                    return;
                }
            }
        });
    }

    let found = tokio::time::timeout(STARTUP_TIMEOUT, rx.recv()).await;
    match found {
        Ok(Some(url)) => Ok((url, uuid::Uuid::new_v4().to_string(), child)),
        _ => {
            let _ = child.start_kill();
            Err(DaemonError::TunnelTimeout)
        }
    }
}

enum EitherRead {
    Out(tokio::process::ChildStdout),
    Err(tokio::process::ChildStderr),
}

/// First well-formed `https://…trycloudflare.com` URL in `line`, if any.
fn extract_quick_tunnel_url(line: &str) -> Option<String> {
    let re = Regex::new(r"https://[a-zA-Z0-9.-]+\.trycloudflare\.com").ok()?;
    re.find(line).map(|m| m.as_str().to_string())
}

fn detects_named_tunnel_registration(line: &str) -> bool {
    line.contains("Registered tunnel connection")
}

fn which(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(binary)).find(|p| p.is_file())
}

#[cfg(target_os = "macos")]
async fn try_homebrew_install(binary: &str) -> bool {
    tokio::process::Command::new("brew")
        .args(["install", binary])
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

fn platform_label() -> String {
    format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)
}

fn download_url_for_platform() -> Option<String> {
    let arch = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => "linux-amd64",
        ("linux", "aarch64") => "linux-arm64",
        ("macos", "x86_64") => "darwin-amd64",
        ("macos", "aarch64") => "darwin-arm64",
        ("windows", "x86_64") => "windows-amd64.exe",
        _ => return None,
    };
    Some(format!(
        "https://github.com/cloudflare/cloudflared/releases/latest/download/cloudflared-{arch}"
    ))
}

async fn download_to(url: &str, dest: &std::path::Path) -> DaemonResult<()> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| DaemonError::TunnelInstall(e.to_string()))?;
    let bytes = response.bytes().await.map_err(|e| DaemonError::TunnelInstall(e.to_string()))?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> DaemonResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> DaemonResult<()> {
    Ok(())
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tunnel_tests;
