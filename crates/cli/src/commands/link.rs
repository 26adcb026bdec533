// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge link` - pair this workstation with the remote client.
//! SPEC_FULL.md §4.8, "Link flow".

use std::io::Write;

use agentbridge_daemon::{Config, Orchestrator};

use crate::exit_error::ExitError;
use crate::output::{OutputFormat, format_or_json};

pub async fn run(format: OutputFormat) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let config = Config::load(config_dir);

    if let Some(machine_id) = config.machine.id.clone() {
        let obj = serde_json::json!({ "already_linked": true, "machineId": machine_id });
        return format_or_json(format, &obj, || {
            println!("already linked (machine id {machine_id})");
        })
        .map_err(|e| ExitError::new(1, e.to_string()));
    }

    let home_dir = dirs::home_dir()
        .ok_or_else(|| ExitError::new(1, "could not determine home directory"))?;
    let orchestrator = Orchestrator::new(config, home_dir, true);

    let (code, qr) = orchestrator.create_link_request().await?;

    let obj = serde_json::json!({ "code": code, "qr": qr });
    format_or_json(format, &obj, || {
        println!("Link code: {}", crate::color::header(&code));
        println!("Scan this payload with the mobile client:");
        println!("{}", serde_json::to_string(&qr).unwrap_or_default());
        println!();
        print!("Waiting for the client to link");
        let _ = std::io::stdout().flush();
    })
    .map_err(|e| ExitError::new(1, e.to_string()))?;

    let on_poll = || {
        if format == OutputFormat::Text {
            print!(".");
            let _ = std::io::stdout().flush();
        }
    };

    let outcome = orchestrator.wait_for_link(&code, on_poll).await?;
    if format == OutputFormat::Text {
        println!();
    }

    let obj = serde_json::json!({
        "linked": true,
        "machineId": outcome.machine_id,
        "userId": outcome.user_id,
    });
    format_or_json(format, &obj, || println!("linked (machine id {})", outcome.machine_id))
        .map_err(|e| ExitError::new(1, e.to_string()))
}
