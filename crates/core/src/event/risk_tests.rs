// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn destructive_shell_command_is_critical() {
    let input = json!({ "command": "rm -rf /tmp/build" });
    assert_eq!(assess_risk("bash", &input, None), RiskLevel::Critical);
}

#[test]
fn sudo_command_is_critical() {
    let input = json!({ "command": "sudo apt-get install foo" });
    assert_eq!(assess_risk("shell", &input, None), RiskLevel::Critical);
}

#[test]
fn command_targeting_root_is_critical() {
    let input = json!({ "command": "chmod -R 777 /" });
    assert_eq!(assess_risk("run", &input, None), RiskLevel::Critical);
}

#[test]
fn ordinary_shell_command_is_high() {
    let input = json!({ "command": "npm install" });
    assert_eq!(assess_risk("bash", &input, None), RiskLevel::High);
}

#[test]
fn write_outside_project_root_is_high() {
    let input = json!({ "path": "/etc/passwd" });
    assert_eq!(assess_risk("write", &input, Some("/home/user/project")), RiskLevel::High);
}

#[test]
fn write_inside_project_root_is_medium() {
    let input = json!({ "path": "/home/user/project/src/main.rs" });
    assert_eq!(assess_risk("edit", &input, Some("/home/user/project")), RiskLevel::Medium);
}

#[test]
fn write_with_unknown_root_defaults_medium() {
    let input = json!({ "path": "src/main.rs" });
    assert_eq!(assess_risk("write", &input, None), RiskLevel::Medium);
}

#[test]
fn network_tool_is_medium() {
    let input = json!({ "url": "https://example.com" });
    assert_eq!(assess_risk("webFetch", &input, None), RiskLevel::Medium);
}

#[test]
fn read_tool_is_low() {
    let input = json!({ "path": "src/main.rs" });
    assert_eq!(assess_risk("read", &input, None), RiskLevel::Low);
}

#[test]
fn search_tool_is_low() {
    let input = json!({ "pattern": "TODO" });
    assert_eq!(assess_risk("grep", &input, None), RiskLevel::Low);
}

#[test]
fn uncategorized_tool_fails_safe_to_medium() {
    let input = json!({});
    assert_eq!(assess_risk("mysteryTool", &input, None), RiskLevel::Medium);
}

#[test]
fn execute_takes_priority_over_write_in_name() {
    assert_eq!(categorize_tool("bash_write_file"), ToolCategory::Execute);
}

#[test]
fn describe_tool_call_truncates_long_commands() {
    let long_command = "echo ".to_string() + &"a".repeat(200);
    let input = json!({ "command": long_command });
    let description = describe_tool_call("bash", &input);
    assert!(description.len() < 100);
    assert!(description.starts_with("Run `"));
}

#[test]
fn describe_tool_call_names_the_file_for_reads_and_writes() {
    let input = json!({ "path": "src/lib.rs" });
    assert_eq!(describe_tool_call("read", &input), "Read src/lib.rs");
    assert_eq!(describe_tool_call("edit", &input), "Edit src/lib.rs");
}

#[test]
fn risk_levels_are_ordered_for_escalation_comparisons() {
    assert!(RiskLevel::Low < RiskLevel::Medium);
    assert!(RiskLevel::Medium < RiskLevel::High);
    assert!(RiskLevel::High < RiskLevel::Critical);
}
