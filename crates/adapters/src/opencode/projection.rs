// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure projection of OpenCode's on-disk message/part shapes into canonical
//! `EventPayload`s. Called identically from history load, the file watcher,
//! the SSE handler, and (for tool-call parts discovered via SSE) permission
//! events — see SPEC_FULL.md §4.3's "real-time sources and precedence".
//!
//! Every function here is idempotent with respect to `DedupTable`: calling
//! it twice with the same (message, parts) snapshot emits the same events
//! only once (property 3 in SPEC_FULL.md §8).

use agentbridge_core::{
    assess_risk, categorize_tool, ContentBlock, EnvironmentContext, EventPayload,
    MessageId, ModelInfo, ProjectInfo, Role, RuntimeInfo, SessionError, ToolCallId,
};

use super::dedup::{DedupTable, ToolPhase};
use super::types::{MessageRecord, PartRecord};

/// Mutable projection context threaded through one session's live state.
pub struct ProjectionState {
    pub dedup: DedupTable,
    pub project_dir: Option<String>,
    pub agent_name: String,
}

impl ProjectionState {
    pub fn new(agent_name: impl Into<String>, project_dir: Option<String>) -> Self {
        Self { dedup: DedupTable::new(), project_dir, agent_name: agent_name.into() }
    }
}

fn text_of(parts: &[PartRecord]) -> String {
    parts
        .iter()
        .filter(|p| p.kind == "text")
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("")
}

/// Project one user message. Emits `message:start`/`message:complete` at
/// most once per message id; no intermediate deltas (per spec).
pub fn project_user_message(state: &mut ProjectionState, msg: &MessageRecord, parts: &[PartRecord]) -> Vec<EventPayload> {
    if state.dedup.message_completed(&msg.id) {
        return Vec::new();
    }
    let text = text_of(parts);
    if text.trim().is_empty() {
        return Vec::new();
    }
    if !state.dedup.mark_message_complete(&msg.id) {
        return Vec::new();
    }
    let message_id = MessageId::new(msg.id.clone());
    vec![
        EventPayload::MessageStart { message_id: message_id.clone(), role: Role::User },
        EventPayload::MessageComplete {
            message_id,
            role: Role::User,
            content: vec![ContentBlock::text(text)],
            model: None,
            stop_reason: None,
        },
    ]
}

/// Project one assistant message plus its parts. May be called repeatedly
/// as parts continue to stream in; only the deltas (state transitions) not
/// yet recorded in `state.dedup` are emitted.
pub fn project_assistant_message(
    state: &mut ProjectionState,
    msg: &MessageRecord,
    parts: &[PartRecord],
) -> Vec<EventPayload> {
    let mut events = Vec::new();
    let message_id = MessageId::new(msg.id.clone());

    if state.project_dir.is_none() {
        if let Some(path) = &msg.path {
            state.project_dir = Some(path.root.clone());
        }
    }

    if state.dedup.mark_environment_info() {
        let project_path = state.project_dir.clone().unwrap_or_default();
        let project_name = project_name_of(&project_path);
        events.push(EventPayload::EnvironmentInfo {
            context: EnvironmentContext {
                agent: state.agent_name.clone(),
                model: msg.model.clone().map(|id| ModelInfo { id, provider: msg.provider.clone() }),
                project: ProjectInfo { path: project_path, name: project_name },
                runtime: RuntimeInfo { os: std::env::consts::OS.to_string(), arch: std::env::consts::ARCH.to_string() },
            },
        });
    }

    if state.dedup.mark_message_start(&msg.id) {
        events.push(EventPayload::MessageStart { message_id: message_id.clone(), role: Role::Assistant });
    }

    for part in parts {
        events.extend(project_part(state, &message_id, part));
    }

    if let Some(finish) = &msg.finish {
        if !state.dedup.message_completed(&msg.id) {
            state.dedup.mark_message_complete(&msg.id);
            let text = text_of(parts);
            let content = if text.is_empty() { Vec::new() } else { vec![ContentBlock::text(text)] };
            let model = match (&msg.provider, &msg.model) {
                (Some(provider), Some(model)) => Some(format!("{provider}/{model}")),
                (None, Some(model)) => Some(model.clone()),
                _ => None,
            };
            events.push(EventPayload::MessageComplete {
                message_id: message_id.clone(),
                role: Role::Assistant,
                content,
                model,
                stop_reason: Some(finish.clone()),
            });

            if msg.error.is_some() {
                events.push(EventPayload::SessionErrorEvent {
                    error: SessionError {
                        code: "ASSISTANT_ERROR".to_string(),
                        message: msg
                            .error
                            .as_ref()
                            .and_then(|e| e.get("message"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("assistant message reported an error")
                            .to_string(),
                        recoverable: true,
                    },
                });
            }
        }
    }

    events
}

fn project_part(state: &mut ProjectionState, message_id: &MessageId, part: &PartRecord) -> Vec<EventPayload> {
    match part.kind.as_str() {
        "text" => {
            if state.dedup.mark_text(&part.id) {
                vec![EventPayload::MessageDelta {
                    message_id: message_id.clone(),
                    role: Role::Assistant,
                    delta: part.text.clone().unwrap_or_default(),
                }]
            } else {
                Vec::new()
            }
        }
        "reasoning" => {
            let has_text = part.text.as_deref().is_some_and(|t| !t.is_empty());
            let has_end = part.time.as_ref().and_then(|t| t.end).is_some();
            let (start, delta, complete) = state.dedup.mark_reasoning(&part.id, has_text, has_end);
            let mut out = Vec::new();
            if start {
                out.push(EventPayload::ThinkingStart { message_id: message_id.clone() });
            }
            if delta {
                out.push(EventPayload::ThinkingDelta {
                    message_id: message_id.clone(),
                    delta: part.text.clone().unwrap_or_default(),
                });
            }
            if complete {
                out.push(EventPayload::ThinkingComplete {
                    message_id: message_id.clone(),
                    text: part.text.clone().unwrap_or_default(),
                });
            }
            out
        }
        "tool" => project_tool_part(state, part),
        "step-finish" => {
            if !state.dedup.mark_step_finish(&part.id) {
                return Vec::new();
            }
            let mut out = Vec::new();
            if let Some(tokens) = &part.tokens {
                let cumulative = tokens.input + tokens.output + tokens.reasoning;
                out.push(EventPayload::ResourceTokenUsage { delta: cumulative, cumulative });
            }
            if let Some(cost) = part.cost {
                if cost > 0.0 {
                    out.push(EventPayload::ResourceCost { delta: cost, cumulative: cost });
                }
            }
            out
        }
        // step-start and any other part type: recorded as seen, no event.
        _ => Vec::new(),
    }
}

fn project_tool_part(state: &mut ProjectionState, part: &PartRecord) -> Vec<EventPayload> {
    let Some(tool_state) = &part.state else { return Vec::new() };
    let Some(phase) = ToolPhase::from_status(&tool_state.status) else { return Vec::new() };
    let Some(new_phase) = state.dedup.advance_tool(&part.id, phase) else { return Vec::new() };

    let tool_call_id = ToolCallId::new(part.id.clone());
    let name = part.tool.clone().unwrap_or_else(|| "unknown".to_string());

    match new_phase {
        ToolPhase::Pending => vec![EventPayload::ToolStart {
            tool_call_id,
            category: categorize_tool(&name),
            description: agentbridge_core::describe_tool_call(&name, &tool_state.input.clone().unwrap_or_default()),
            name,
        }],
        ToolPhase::Running => {
            let input = tool_state.input.clone().unwrap_or_default();
            let risk_level = assess_risk(&name, &input, state.project_dir.as_deref());
            vec![EventPayload::ToolExecuting { tool_call_id, name, input, risk_level, requires_approval: false }]
        }
        ToolPhase::Completed => {
            let duration_ms = tool_state
                .time
                .as_ref()
                .and_then(|t| match (t.start, t.end) {
                    (Some(start), Some(end)) => Some((end - start).max(0) as u64),
                    _ => None,
                })
                .unwrap_or(0);
            vec![EventPayload::ToolResult {
                tool_call_id,
                name,
                output: tool_state.output.clone().unwrap_or_default(),
                duration_ms,
            }]
        }
        ToolPhase::Error => vec![EventPayload::ToolError {
            tool_call_id,
            name,
            error: tool_state.error.clone().unwrap_or_default(),
        }],
    }
}

fn project_name_of(path: &str) -> String {
    if path.is_empty() {
        return "Unknown".to_string();
    }
    std::path::Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Used by `discover_sessions` too: project directory's display name, or
/// the literal `"Unknown"` when the field is empty.
pub fn project_name_from_directory(directory: &str) -> String {
    project_name_of(directory)
}

#[cfg(test)]
#[path = "projection_tests.rs"]
mod tests;
