// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single dedup table every input source (history load, file watcher,
//! SSE stream, spawned child's stdout) feeds into. Keyed by part or message
//! id; an event for a part/message that has already been projected in that
//! state is dropped. This is the architectural linchpin described in
//! SPEC_FULL.md §9: centralizing projection here is what lets three
//! independent producers (disk, SSE, stdout) safely race each other.

use std::collections::{HashMap, HashSet};

/// How far along a tool call's lifecycle we have already emitted an event for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolPhase {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolPhase {
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ReasoningState {
    started: bool,
    delta_sent: bool,
    complete_sent: bool,
}

/// Tracks what has already been projected, so every producer can call the
/// same "have I seen this before" check.
#[derive(Default)]
pub struct DedupTable {
    text_seen: HashSet<String>,
    reasoning: HashMap<String, ReasoningState>,
    tool_phase: HashMap<String, ToolPhase>,
    step_finish_seen: HashSet<String>,
    /// Message ids whose `message:start`/`message:complete` pair has
    /// already been emitted (covers both user and assistant messages).
    message_complete_seen: HashSet<String>,
    message_start_seen: HashSet<String>,
    environment_info_emitted: bool,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// First sighting of a `text` part. Returns `true` exactly once per id.
    pub fn mark_text(&mut self, part_id: &str) -> bool {
        self.text_seen.insert(part_id.to_string())
    }

    /// Returns `(should_emit_start, should_emit_delta, should_emit_complete)`
    /// for a `reasoning` part given whether it currently has text and/or an
    /// `end` timestamp.
    pub fn mark_reasoning(&mut self, part_id: &str, has_text: bool, has_end: bool) -> (bool, bool, bool) {
        let state = self.reasoning.entry(part_id.to_string()).or_default();
        let start = !state.started;
        let delta = has_text && !state.delta_sent;
        let complete = has_end && !state.complete_sent;
        state.started = true;
        if delta {
            state.delta_sent = true;
        }
        if complete {
            state.complete_sent = true;
        }
        (start, delta, complete)
    }

    /// Returns the new phase to emit, if the part has progressed past what
    /// was last recorded for it.
    pub fn advance_tool(&mut self, part_id: &str, observed: ToolPhase) -> Option<ToolPhase> {
        match self.tool_phase.get(part_id) {
            Some(prev) if *prev == observed => None,
            _ => {
                self.tool_phase.insert(part_id.to_string(), observed);
                Some(observed)
            }
        }
    }

    pub fn mark_step_finish(&mut self, part_id: &str) -> bool {
        self.step_finish_seen.insert(part_id.to_string())
    }

    pub fn mark_message_start(&mut self, message_id: &str) -> bool {
        self.message_start_seen.insert(message_id.to_string())
    }

    pub fn mark_message_complete(&mut self, message_id: &str) -> bool {
        self.message_complete_seen.insert(message_id.to_string())
    }

    pub fn message_completed(&self, message_id: &str) -> bool {
        self.message_complete_seen.contains(message_id)
    }

    pub fn mark_environment_info(&mut self) -> bool {
        let first = !self.environment_info_emitted;
        self.environment_info_emitted = true;
        first
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
