// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook/plugin installation: injects a small script into each supported
//! agent's own configuration so the agent escalates tool-approval
//! prompts through this daemon. SPEC_FULL.md §4.9. Called once per
//! loaded adapter at daemon startup; filesystem failures (read-only
//! home directory, missing config) are logged at info and never fail
//! startup.

use std::path::Path;

use serde_json::Value;

const PRE_TOOL_USE_SH: &str = include_str!("assets/pre-tool-use.sh");
const OPENCODE_PLUGIN_JS: &str = include_str!("assets/agentap-plugin.js");
const CLAUDE_MATCHER: &str = "Bash|Write|Edit|NotebookEdit";

/// Copy `pre-tool-use.sh` into `<config_dir>/hooks/` and merge a
/// `PreToolUse` entry into `~/.claude/settings.json`. Read-only
/// filesystem errors are logged at info, not propagated.
pub fn install_claude_code_hook(config_dir: &Path, home_dir: &Path) {
    let hooks_dir = config_dir.join("hooks");
    let script_path = hooks_dir.join("pre-tool-use.sh");

    if let Err(e) = copy_script(&hooks_dir, &script_path, PRE_TOOL_USE_SH) {
        tracing::info!(error = %e, "could not install claude-code hook script (continuing)");
        return;
    }

    let settings_path = home_dir.join(".claude").join("settings.json");
    if let Err(e) = merge_claude_settings(&settings_path, &script_path) {
        tracing::info!(error = %e, "could not update claude-code settings.json (continuing)");
    }
}

/// Copy `agentap-plugin.js` into `~/.config/opencode/plugins/`,
/// overwriting any existing copy.
pub fn install_opencode_hook(home_dir: &Path) {
    let plugins_dir = home_dir.join(".config").join("opencode").join("plugins");
    let dest = plugins_dir.join("agentap-plugin.js");
    if let Err(e) = (|| -> std::io::Result<()> {
        std::fs::create_dir_all(&plugins_dir)?;
        std::fs::write(&dest, OPENCODE_PLUGIN_JS)
    })() {
        tracing::info!(error = %e, "could not install opencode hook plugin (continuing)");
    }
}

#[cfg(unix)]
fn copy_script(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir)?;
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn copy_script(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(path, contents)
}

/// Merge a `PreToolUse` hook entry pointing at `script_path` into
/// `settings_path`. If an entry already references our script with a
/// `.*` matcher, repair it to [`CLAUDE_MATCHER`] (SPEC_FULL.md §9, "only
/// repair the exact case the source repairs"). Any other mismatch
/// (wrong timeout, wrong type, extra fields) is left untouched.
fn merge_claude_settings(settings_path: &Path, script_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = settings_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut settings: Value = match std::fs::read_to_string(settings_path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e),
    };

    if !settings.is_object() {
        settings = serde_json::json!({});
    }
    let command = script_path.display().to_string();
    let Some(settings_obj) = settings.as_object_mut() else {
        return Ok(());
    };
    let hooks = settings_obj.entry("hooks").or_insert_with(|| serde_json::json!({}));
    if !hooks.is_object() {
        *hooks = serde_json::json!({});
    }
    let Some(hooks_obj) = hooks.as_object_mut() else {
        return Ok(());
    };
    let pre_tool_use = hooks_obj.entry("PreToolUse").or_insert_with(|| serde_json::json!([]));
    if !pre_tool_use.is_array() {
        *pre_tool_use = serde_json::json!([]);
    }
    let Some(entries) = pre_tool_use.as_array_mut() else {
        return Ok(());
    };

    let existing = entries.iter_mut().find(|entry| entry_references_command(entry, &command));
    match existing {
        Some(entry) => {
            if entry.get("matcher").and_then(Value::as_str) == Some(".*") {
                entry["matcher"] = Value::String(CLAUDE_MATCHER.to_string());
            }
        }
        None => {
            entries.push(serde_json::json!({
                "matcher": CLAUDE_MATCHER,
                "hooks": [{ "type": "command", "command": command }],
            }));
        }
    }

    std::fs::write(settings_path, serde_json::to_string_pretty(&settings)?)
}

fn entry_references_command(entry: &Value, command: &str) -> bool {
    entry
        .get("hooks")
        .and_then(Value::as_array)
        .map(|hooks| {
            hooks.iter().any(|h| h.get("command").and_then(Value::as_str) == Some(command))
        })
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
