// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn claude_code_hook_installs_script_and_settings() {
    let config_dir = tempfile::tempdir().unwrap();
    let home_dir = tempfile::tempdir().unwrap();

    install_claude_code_hook(config_dir.path(), home_dir.path());

    let script = config_dir.path().join("hooks").join("pre-tool-use.sh");
    assert!(script.exists());
    assert_eq!(std::fs::read_to_string(&script).unwrap(), PRE_TOOL_USE_SH);

    let settings_path = home_dir.path().join(".claude").join("settings.json");
    let settings: Value =
        serde_json::from_str(&std::fs::read_to_string(&settings_path).unwrap()).unwrap();
    let entries = settings["hooks"]["PreToolUse"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["matcher"], CLAUDE_MATCHER);
}

#[test]
fn claude_code_hook_repairs_wildcard_matcher_for_our_script() {
    let config_dir = tempfile::tempdir().unwrap();
    let home_dir = tempfile::tempdir().unwrap();
    let script = config_dir.path().join("hooks").join("pre-tool-use.sh");

    let settings_dir = home_dir.path().join(".claude");
    std::fs::create_dir_all(&settings_dir).unwrap();
    std::fs::write(
        settings_dir.join("settings.json"),
        serde_json::json!({
            "hooks": {
                "PreToolUse": [{
                    "matcher": ".*",
                    "hooks": [{"type": "command", "command": script.display().to_string()}],
                }]
            }
        })
        .to_string(),
    )
    .unwrap();

    install_claude_code_hook(config_dir.path(), home_dir.path());

    let settings: Value = serde_json::from_str(
        &std::fs::read_to_string(settings_dir.join("settings.json")).unwrap(),
    )
    .unwrap();
    let entries = settings["hooks"]["PreToolUse"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["matcher"], CLAUDE_MATCHER);
}

#[test]
fn claude_code_hook_leaves_other_matchers_for_our_script_alone() {
    let config_dir = tempfile::tempdir().unwrap();
    let home_dir = tempfile::tempdir().unwrap();
    let script = config_dir.path().join("hooks").join("pre-tool-use.sh");

    let settings_dir = home_dir.path().join(".claude");
    std::fs::create_dir_all(&settings_dir).unwrap();
    std::fs::write(
        settings_dir.join("settings.json"),
        serde_json::json!({
            "hooks": {
                "PreToolUse": [{
                    "matcher": "Bash",
                    "hooks": [{"type": "command", "command": script.display().to_string()}],
                }]
            }
        })
        .to_string(),
    )
    .unwrap();

    install_claude_code_hook(config_dir.path(), home_dir.path());

    let settings: Value = serde_json::from_str(
        &std::fs::read_to_string(settings_dir.join("settings.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(settings["hooks"]["PreToolUse"][0]["matcher"], "Bash");
}

#[test]
fn claude_code_hook_preserves_unrelated_settings() {
    let config_dir = tempfile::tempdir().unwrap();
    let home_dir = tempfile::tempdir().unwrap();
    let settings_dir = home_dir.path().join(".claude");
    std::fs::create_dir_all(&settings_dir).unwrap();
    std::fs::write(
        settings_dir.join("settings.json"),
        serde_json::json!({"theme": "dark"}).to_string(),
    )
    .unwrap();

    install_claude_code_hook(config_dir.path(), home_dir.path());

    let settings: Value = serde_json::from_str(
        &std::fs::read_to_string(settings_dir.join("settings.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(settings["theme"], "dark");
    assert_eq!(settings["hooks"]["PreToolUse"].as_array().unwrap().len(), 1);
}

#[test]
fn opencode_hook_overwrites_existing_plugin() {
    let home_dir = tempfile::tempdir().unwrap();
    let plugins_dir = home_dir.path().join(".config").join("opencode").join("plugins");
    std::fs::create_dir_all(&plugins_dir).unwrap();
    std::fs::write(plugins_dir.join("agentap-plugin.js"), "// stale").unwrap();

    install_opencode_hook(home_dir.path());

    let contents = std::fs::read_to_string(plugins_dir.join("agentap-plugin.js")).unwrap();
    assert_eq!(contents, OPENCODE_PLUGIN_JS);
}

#[cfg(unix)]
#[test]
fn read_only_home_is_tolerated() {
    use std::os::unix::fs::PermissionsExt;
    let config_dir = tempfile::tempdir().unwrap();
    let home_dir = tempfile::tempdir().unwrap();
    let claude_dir = home_dir.path().join(".claude");
    std::fs::create_dir_all(&claude_dir).unwrap();
    std::fs::set_permissions(&claude_dir, std::fs::Permissions::from_mode(0o500)).unwrap();

    // Must not panic even though settings.json cannot be written.
    install_claude_code_hook(config_dir.path(), home_dir.path());

    std::fs::set_permissions(&claude_dir, std::fs::Permissions::from_mode(0o700)).unwrap();
}
