// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk JSON shapes for OpenCode's session store
//! (`storage/{session,message,part}/...`). Deserialization is lenient:
//! unknown fields are ignored and most fields are optional, so a newer
//! OpenCode release that adds fields never breaks discovery or projection.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub time: SessionTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionTime {
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    pub archived: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub path: Option<MessagePath>,
    #[serde(default)]
    pub finish: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub time: Option<MessageTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePath {
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: i64,
    pub completed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Name of the invoked tool, present on `type: "tool"` parts.
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub time: Option<PartTime>,
    #[serde(default)]
    pub state: Option<ToolState>,
    #[serde(default)]
    pub tokens: Option<TokenUsage>,
    #[serde(default)]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartTime {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolState {
    pub status: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub time: Option<PartTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
}

/// `message.updated` / `message.part.updated` SSE payload envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Value,
}

/// Best-effort extraction of the `sessionID` a nested SSE payload refers to,
/// whether it appears on the envelope's `properties`, a `part`, `info`
/// (message), or `permissions` object.
pub fn sse_session_id(properties: &Value) -> Option<String> {
    if let Some(id) = properties.get("sessionID").and_then(|v| v.as_str()) {
        return Some(id.to_string());
    }
    for key in ["part", "info", "permission"] {
        if let Some(id) =
            properties.get(key).and_then(|v| v.get("sessionID")).and_then(|v| v.as_str())
        {
            return Some(id.to_string());
        }
    }
    None
}
