// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge status` - report whether a daemon is running.
//!
//! The pidfile (SPEC_FULL.md §6) carries only a port, not a pid, so
//! "running" is determined the same way a hook script would find the
//! daemon: read the port, then probe its health endpoint. A pidfile
//! whose port answers nothing is stale and removed (SPEC_FULL.md §6,
//! "Pidfile").

use std::time::Duration;

use agentbridge_daemon::{Config, pidfile};

use crate::exit_error::ExitError;
use crate::output::{OutputFormat, format_or_json};

const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

pub async fn run(format: OutputFormat) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let pidfile_path = config_dir.join("daemon.pid");

    let Some(port) = pidfile::read(&pidfile_path) else {
        return print_not_running(format);
    };

    if probe_health(port).await {
        let obj = serde_json::json!({ "status": "running", "port": port });
        format_or_json(format, &obj, || {
            println!("{} on port {port}", crate::color::header("running"));
        })
        .map_err(|e| ExitError::new(1, e.to_string()))
    } else {
        // Stale pidfile: nothing answers on the recorded port.
        pidfile::remove(&pidfile_path);
        print_not_running(format)
    }
}

fn print_not_running(format: OutputFormat) -> Result<(), ExitError> {
    let obj = serde_json::json!({ "status": "not_running" });
    format_or_json(format, &obj, || println!("{}", crate::color::muted("not running")))
        .map_err(|e| ExitError::new(1, e.to_string()))
}

async fn probe_health(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/health");
    match reqwest::Client::new().get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
