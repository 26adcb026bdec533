// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic tool-call risk and category classification.
//!
//! Pure functions: same `(name, input)` always yields the same verdict.
//! `describe_tool_call` is UI text only — never consult it for a security
//! decision, use [`assess_risk`].

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Risk tier assigned to a tool invocation before it is surfaced for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Closed set of tool categories used for display and rough classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Read,
    Write,
    Execute,
    Network,
    Search,
    Other,
}

const EXECUTE_TOOLS: &[&str] = &["bash", "shell", "run", "execute", "process", "exec"];
const WRITE_TOOLS: &[&str] = &["write", "edit", "patch", "delete", "remove", "notebookedit"];
const READ_TOOLS: &[&str] = &["read", "cat", "view", "list", "ls", "glob"];
const SEARCH_TOOLS: &[&str] = &["grep", "search", "find"];
const NETWORK_TOOLS: &[&str] = &["fetch", "http", "websearch", "webfetch", "curl"];

fn name_matches(name: &str, table: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    table.iter().any(|candidate| lower.contains(candidate))
}

/// Categorize a tool name into the closed `{read, write, execute, network,
/// search, other}` set, by substring match against documented tables.
/// Execute takes priority over write/read so e.g. a tool named
/// `"bash_write_file"` is still treated as an execution tool.
pub fn categorize_tool(name: &str) -> ToolCategory {
    if name_matches(name, EXECUTE_TOOLS) {
        ToolCategory::Execute
    } else if name_matches(name, NETWORK_TOOLS) {
        ToolCategory::Network
    } else if name_matches(name, SEARCH_TOOLS) {
        ToolCategory::Search
    } else if name_matches(name, WRITE_TOOLS) {
        ToolCategory::Write
    } else if name_matches(name, READ_TOOLS) {
        ToolCategory::Read
    } else {
        ToolCategory::Other
    }
}

/// Substrings in a shell command that always escalate to [`RiskLevel::Critical`].
const CRITICAL_COMMAND_PATTERNS: &[&str] =
    &["rm -rf", "rm -fr", "sudo ", "dd if=", "dd of=", ":(){ :|:& };:", "mkfs"];

fn command_text(input: &serde_json::Value) -> String {
    for key in ["command", "cmd", "script"] {
        if let Some(s) = input.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    input.to_string()
}

fn targets_root_or_home(command: &str) -> bool {
    let trimmed = command.trim();
    trimmed.contains(" / ")
        || trimmed.ends_with(" /")
        || trimmed.contains(" ~ ")
        || trimmed.ends_with(" ~")
        || trimmed.contains(" /*")
}

fn file_path_from_input(input: &serde_json::Value) -> Option<String> {
    for key in ["path", "file_path", "filePath", "filename"] {
        if let Some(s) = input.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    None
}

fn is_outside_project_root(path: &str, project_root: Option<&str>) -> bool {
    let Some(root) = project_root else { return false };
    let path = Path::new(path);
    if path.is_relative() {
        return false;
    }
    !path.starts_with(Path::new(root))
}

/// Classify the risk of invoking `tool_name` with `input`, evaluated in a
/// fixed, documented order (first match wins):
///
/// 1. Execute-category tools whose command looks destructive (`rm -rf`,
///    `sudo`, `dd`, a fork bomb, `mkfs`) or targets `/` or `~` → `Critical`.
/// 2. Any other execute-category tool → `High`.
/// 3. Write-category tools targeting a path outside `project_root` → `High`.
/// 4. Write-category tools targeting a path inside `project_root` (or when
///    the root is unknown) → `Medium`.
/// 5. Network-category tools → `Medium`.
/// 6. Read/search-category tools → `Low`.
/// 7. Anything uncategorized → `Medium` (fail safe, never silently `Low`).
pub fn assess_risk(tool_name: &str, input: &serde_json::Value, project_root: Option<&str>) -> RiskLevel {
    match categorize_tool(tool_name) {
        ToolCategory::Execute => {
            let command = command_text(input);
            let lower = command.to_ascii_lowercase();
            if CRITICAL_COMMAND_PATTERNS.iter().any(|p| lower.contains(p)) || targets_root_or_home(&command) {
                RiskLevel::Critical
            } else {
                RiskLevel::High
            }
        }
        ToolCategory::Write => match file_path_from_input(input) {
            Some(path) if is_outside_project_root(&path, project_root) => RiskLevel::High,
            _ => RiskLevel::Medium,
        },
        ToolCategory::Network => RiskLevel::Medium,
        ToolCategory::Read | ToolCategory::Search => RiskLevel::Low,
        ToolCategory::Other => RiskLevel::Medium,
    }
}

/// Short human-readable description of a tool call. UI text only.
pub fn describe_tool_call(tool_name: &str, input: &serde_json::Value) -> String {
    match categorize_tool(tool_name) {
        ToolCategory::Execute => {
            let command = command_text(input);
            if command.is_empty() {
                format!("Run {tool_name}")
            } else {
                format!("Run `{}`", truncate(&command, 80))
            }
        }
        ToolCategory::Write => match file_path_from_input(input) {
            Some(path) => format!("Edit {}", truncate(&path, 80)),
            None => format!("{tool_name}"),
        },
        ToolCategory::Read => match file_path_from_input(input) {
            Some(path) => format!("Read {}", truncate(&path, 80)),
            None => format!("{tool_name}"),
        },
        ToolCategory::Search => format!("{tool_name}"),
        ToolCategory::Network => format!("{tool_name}"),
        ToolCategory::Other => tool_name.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

#[cfg(test)]
#[path = "risk_tests.rs"]
mod tests;
