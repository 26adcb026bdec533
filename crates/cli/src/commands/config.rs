// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge config get|set` - read or write one dotted key inside
//! the on-disk config record. SPEC_FULL.md §6, "CLI surface" &
//! "Shared state policy" (the config record may also be mutated here,
//! not just at link completion).

use clap::Subcommand;
use serde_json::Value;

use agentbridge_daemon::Config;

use crate::exit_error::ExitError;
use crate::output::{OutputFormat, format_or_json};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the value at a dotted key, e.g. `daemon.port`.
    Get { key: String },
    /// Set the value at a dotted key. The value is parsed as JSON when
    /// possible (so `true`/`123` behave as bool/number), otherwise kept
    /// as a plain string.
    Set { key: String, value: String },
}

pub async fn run(command: ConfigCommand, format: OutputFormat) -> Result<(), ExitError> {
    match command {
        ConfigCommand::Get { key } => get(&key, format),
        ConfigCommand::Set { key, value } => set(&key, &value, format),
    }
}

fn get(key: &str, format: OutputFormat) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let config = Config::load(config_dir);
    let document = serde_json::to_value(&config).map_err(|e| ExitError::new(1, e.to_string()))?;

    let value = navigate(&document, key)
        .ok_or_else(|| ExitError::new(1, format!("unknown config key: {key}")))?;

    let obj = serde_json::json!({ "key": key, "value": value });
    format_or_json(format, &obj, || println!("{}", render(value)))
        .map_err(|e| ExitError::new(1, e.to_string()))
}

fn set(key: &str, raw_value: &str, format: OutputFormat) -> Result<(), ExitError> {
    let config_dir = Config::default_config_dir()?;
    let config = Config::load(config_dir.clone());
    let mut document = serde_json::to_value(&config).map_err(|e| ExitError::new(1, e.to_string()))?;

    let parsed: Value = serde_json::from_str(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_string()));
    set_path(&mut document, key, parsed)
        .map_err(|e| ExitError::new(1, format!("unknown config key: {key} ({e})")))?;

    let mut updated: Config =
        serde_json::from_value(document).map_err(|e| ExitError::new(1, format!("invalid value for {key}: {e}")))?;
    updated.set_config_dir(config_dir);
    updated.save()?;

    let obj = serde_json::json!({ "key": key, "set": true });
    format_or_json(format, &obj, || println!("set {key}"))
        .map_err(|e| ExitError::new(1, e.to_string()))
}

fn navigate<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_path(document: &mut Value, key: &str, new_value: Value) -> Result<(), &'static str> {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else { return Err("empty key") };

    let mut current = document;
    for segment in parents {
        current = current
            .as_object_mut()
            .ok_or("not an object")?
            .get_mut(*segment)
            .ok_or("no such section")?;
    }
    let object = current.as_object_mut().ok_or("not an object")?;
    if !object.contains_key(*last) {
        return Err("no such field");
    }
    object.insert((*last).to_string(), new_value);
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
