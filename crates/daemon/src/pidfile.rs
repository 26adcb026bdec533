// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's pidfile: `<config_dir>/daemon.pid`, mode 0600, contents
//! an ASCII decimal port number. Hook scripts injected into an agent's
//! own config (see `hooks`) read this file to find the daemon's
//! WebSocket/HTTP port. Tolerant of stale files: a reader never assumes
//! the listed port still answers, it just tries it.

use std::path::Path;

/// Write the pidfile. Errors are logged by the caller, not propagated:
/// a write failure must not block daemon startup (SPEC_FULL.md §4.4 step 3).
pub fn write(path: &Path, port: u16) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_secure(path, port.to_string().as_bytes())
}

/// Remove the pidfile on clean shutdown. Tolerates it already being gone.
pub fn remove(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(error = %e, path = %path.display(), "failed to remove pidfile");
        }
    }
}

/// Read the port back out of a pidfile, if present and well-formed.
pub fn read(path: &Path) -> Option<u16> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn write_secure(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_secure(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod pidfile_tests;
