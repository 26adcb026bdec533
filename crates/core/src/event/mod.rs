// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical ("ACP") event protocol.
//!
//! Every input from every agent adapter is projected into one of the
//! variants below before it reaches the session table or a WebSocket
//! client. Serializes as `{"type": "event:name", ...fields}`; an unknown
//! tag on the wire deserializes into [`Event::Custom`] instead of failing,
//! so a future agent's unrecognized event never takes the daemon down.

mod risk;
mod sequence;

pub use risk::{assess_risk, categorize_tool, describe_tool_call, RiskLevel, ToolCategory};
pub use sequence::SequenceRegistry;

use crate::ids::{MessageId, PartId, RequestId, SessionId, ToolCallId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Status a session can be in, per the taxonomy in the spec's data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Starting,
    Running,
    WaitingForInput,
    WaitingForApproval,
    Completed,
    Error,
}

/// One block of message content. Only `Text` is produced by the OpenCode
/// adapter today; `Other` preserves anything a future agent sends so
/// unrecognized block shapes still round-trip instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    /// The text of this block, if it is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        }
    }
}

/// A structured error, as carried by `session:error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

/// Context reported by `environment:info`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    pub project: ProjectInfo,
    pub runtime: RuntimeInfo,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub os: String,
    pub arch: String,
}

/// Preview metadata attached to an `approval:requested` event. UI-only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApprovalPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

/// The payload carried by one canonical event, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "session:started")]
    SessionStarted {
        agent: String,
        #[serde(rename = "projectPath")]
        project_path: String,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "workingDirectory")]
        working_directory: String,
    },

    #[serde(rename = "session:status_changed")]
    SessionStatusChanged { from: SessionStatus, to: SessionStatus },

    #[serde(rename = "session:completed")]
    SessionCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    #[serde(rename = "session:error")]
    SessionErrorEvent { error: SessionError },

    #[serde(rename = "message:start")]
    MessageStart { #[serde(rename = "messageId")] message_id: MessageId, role: Role },

    #[serde(rename = "message:delta")]
    MessageDelta { #[serde(rename = "messageId")] message_id: MessageId, role: Role, delta: String },

    #[serde(rename = "message:complete")]
    MessageComplete {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        role: Role,
        content: Vec<ContentBlock>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },

    #[serde(rename = "thinking:start")]
    ThinkingStart { #[serde(rename = "messageId")] message_id: MessageId },

    #[serde(rename = "thinking:delta")]
    ThinkingDelta { #[serde(rename = "messageId")] message_id: MessageId, delta: String },

    #[serde(rename = "thinking:complete")]
    ThinkingComplete { #[serde(rename = "messageId")] message_id: MessageId, text: String },

    #[serde(rename = "tool:start")]
    ToolStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        name: String,
        category: ToolCategory,
        description: String,
    },

    #[serde(rename = "tool:executing")]
    ToolExecuting {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        name: String,
        input: serde_json::Value,
        #[serde(rename = "riskLevel")]
        risk_level: RiskLevel,
        #[serde(rename = "requiresApproval")]
        requires_approval: bool,
    },

    #[serde(rename = "tool:result")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        name: String,
        output: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },

    #[serde(rename = "tool:error")]
    ToolError { #[serde(rename = "toolCallId")] tool_call_id: ToolCallId, name: String, error: String },

    #[serde(rename = "approval:requested")]
    ApprovalRequested {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "toolInput")]
        tool_input: serde_json::Value,
        description: String,
        #[serde(rename = "riskLevel")]
        risk_level: RiskLevel,
        #[serde(rename = "expiresAt")]
        expires_at: String,
        preview: ApprovalPreview,
    },

    #[serde(rename = "approval:resolved")]
    ApprovalResolved {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        approved: bool,
        #[serde(rename = "resolvedBy")]
        resolved_by: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "environment:info")]
    EnvironmentInfo { context: EnvironmentContext },

    #[serde(rename = "resource:token_usage")]
    ResourceTokenUsage { delta: u64, cumulative: u64 },

    #[serde(rename = "resource:cost")]
    ResourceCost { delta: f64, cumulative: f64 },

    /// Catch-all for tags this build doesn't recognize. Never produced by the
    /// OpenCode adapter; exists so a forward-incompatible event from a newer
    /// agent adapter round-trips instead of failing to deserialize.
    #[serde(other)]
    Custom,
}

/// One canonical event: a payload plus the envelope every event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub timestamp: String,
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Tag of the underlying payload, e.g. `"tool:start"`. Useful for logging
    /// without matching the whole payload.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            EventPayload::SessionStarted { .. } => "session:started",
            EventPayload::SessionStatusChanged { .. } => "session:status_changed",
            EventPayload::SessionCompleted { .. } => "session:completed",
            EventPayload::SessionErrorEvent { .. } => "session:error",
            EventPayload::MessageStart { .. } => "message:start",
            EventPayload::MessageDelta { .. } => "message:delta",
            EventPayload::MessageComplete { .. } => "message:complete",
            EventPayload::ThinkingStart { .. } => "thinking:start",
            EventPayload::ThinkingDelta { .. } => "thinking:delta",
            EventPayload::ThinkingComplete { .. } => "thinking:complete",
            EventPayload::ToolStart { .. } => "tool:start",
            EventPayload::ToolExecuting { .. } => "tool:executing",
            EventPayload::ToolResult { .. } => "tool:result",
            EventPayload::ToolError { .. } => "tool:error",
            EventPayload::ApprovalRequested { .. } => "approval:requested",
            EventPayload::ApprovalResolved { .. } => "approval:resolved",
            EventPayload::EnvironmentInfo { .. } => "environment:info",
            EventPayload::ResourceTokenUsage { .. } => "resource:token_usage",
            EventPayload::ResourceCost { .. } => "resource:cost",
            EventPayload::Custom => "custom",
        }
    }
}

/// Per-session feature flags and identity, reported by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub agent: String,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub version: String,
    #[serde(rename = "integrationMethod")]
    pub integration_method: IntegrationMethod,
    pub streaming: StreamingCapabilities,
    pub approval: ApprovalCapabilities,
    #[serde(rename = "sessionControl")]
    pub session_control: SessionControlCapabilities,
    pub planning: bool,
    pub resources: ResourceCapabilities,
    #[serde(rename = "fileOperations")]
    pub file_operations: FileOperationCapabilities,
    #[serde(rename = "userInteraction")]
    pub user_interaction: UserInteractionCapabilities,
    #[serde(rename = "subAgents")]
    pub sub_agents: bool,
    pub git: bool,
    #[serde(rename = "webSearch")]
    pub web_search: bool,
    pub multimodal: bool,
    pub thinking: bool,
    #[serde(rename = "customEventTypes", default, skip_serializing_if = "Vec::is_empty")]
    pub custom_event_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationMethod {
    FileWatch,
    Process,
    Http,
    Sse,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamingCapabilities {
    pub messages: bool,
    pub thinking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalCapabilities {
    pub supported: bool,
    pub preview: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionControlCapabilities {
    pub cancel: bool,
    pub pause: bool,
    pub resume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceCapabilities {
    pub cost: bool,
    pub tokens: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileOperationCapabilities {
    pub diffs: bool,
    #[serde(rename = "batchedChanges")]
    pub batched_changes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInteractionCapabilities {
    pub multimodal: bool,
}

/// Arbitrary key/value tags a tool call's preview description can reference.
/// Kept as a type alias so callers don't need to depend on `serde_json`
/// directly for this one spot.
pub type Metadata = HashMap<String, serde_json::Value>;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
