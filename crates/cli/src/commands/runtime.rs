// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A CLI-local sidecar next to the daemon's pidfile, recording the OS
//! pid of a foreground `agentbridge start` run. The daemon's own
//! pidfile (SPEC_FULL.md §6) intentionally carries only a port, for
//! agent hook scripts; this file exists solely so a second `agentbridge`
//! invocation (`stop`) run on the same machine can find the process to
//! signal. See DESIGN.md, "CLI process lifecycle".

use std::path::{Path, PathBuf};

pub fn runtime_pid_path(config_dir: &Path) -> PathBuf {
    config_dir.join("daemon.runtime.pid")
}

pub fn write(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())
}

pub fn read(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}
