// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge start` - run the daemon in the foreground.

use agentbridge_daemon::{Config, Orchestrator};

use crate::commands::runtime;
use crate::exit_error::ExitError;

pub async fn run(port: Option<u16>, no_tunnel: bool, api_url: Option<String>) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let mut config = Config::load(config_dir.clone());
    if let Some(port) = port {
        config.daemon.port = port;
    }
    if let Some(api_url) = api_url {
        config.api.url = api_url;
    }
    let no_tunnel = no_tunnel || config.tunnel.no_tunnel;

    let home_dir = dirs::home_dir()
        .ok_or_else(|| ExitError::new(1, "could not determine home directory"))?;

    let runtime_pid_path = runtime::runtime_pid_path(&config_dir);
    if let Err(e) = runtime::write(&runtime_pid_path) {
        tracing::warn!(error = %e, "failed to write runtime pidfile");
    }

    let orchestrator = Orchestrator::new(config, home_dir, no_tunnel);
    orchestrator.start().await?;
    println!("agentbridge daemon started");

    tokio::signal::ctrl_c().await.map_err(|e| ExitError::new(1, e.to_string()))?;

    println!("shutting down...");
    orchestrator.stop().await;
    runtime::remove(&runtime_pid_path);
    Ok(())
}
