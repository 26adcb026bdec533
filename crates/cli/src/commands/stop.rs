// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge stop` - signal a foreground `agentbridge start` to shut
//! down. See `commands::runtime` for why this needs its own sidecar
//! file rather than the daemon's port-only pidfile.

use agentbridge_daemon::{Config, pidfile};

use crate::commands::runtime;
use crate::exit_error::ExitError;
use crate::output::{OutputFormat, format_or_json};

pub async fn run(format: OutputFormat) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let runtime_pid_path = runtime::runtime_pid_path(&config_dir);

    let Some(pid) = runtime::read(&runtime_pid_path) else {
        return report(format, false, "daemon not running");
    };

    match signal_terminate(pid) {
        Ok(()) => {
            runtime::remove(&runtime_pid_path);
            pidfile::remove(&config_dir.join("daemon.pid"));
            report(format, true, "daemon stopped")
        }
        Err(_) => {
            // Process is gone but the sidecar file survived (e.g. a
            // crash). Clean up and report as already stopped.
            runtime::remove(&runtime_pid_path);
            report(format, false, "daemon not running")
        }
    }
}

fn report(format: OutputFormat, stopped: bool, message: &str) -> Result<(), ExitError> {
    let obj = serde_json::json!({ "stopped": stopped, "message": message });
    format_or_json(format, &obj, || println!("{message}"))
        .map_err(|e| ExitError::new(1, e.to_string()))
}

#[cfg(unix)]
fn signal_terminate(pid: u32) -> Result<(), nix::errno::Errno> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM)
}

#[cfg(not(unix))]
fn signal_terminate(_pid: u32) -> Result<(), std::io::Error> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "not supported on this platform"))
}
