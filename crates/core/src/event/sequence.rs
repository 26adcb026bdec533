// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session monotonic sequence numbering.
//!
//! One [`SequenceRegistry`] is owned by the orchestrator for the lifetime of
//! a daemon process. It is deliberately instantiatable rather than a
//! process-wide singleton so unit and integration tests can run in parallel
//! without sequence numbers leaking between them.

use crate::ids::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{Event, EventPayload};

/// Hands out gap-free, per-session monotonic sequence numbers.
pub struct SequenceRegistry {
    counters: Mutex<HashMap<SessionId, u64>>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self { counters: Mutex::new(HashMap::new()) }
    }

    /// Next sequence number for `session_id`, starting at 0 for a session
    /// seen for the first time.
    fn next_sequence(&self, session_id: &SessionId) -> u64 {
        let mut counters = self.counters.lock();
        let counter = counters.entry(session_id.clone()).or_insert(0);
        let sequence = *counter;
        *counter += 1;
        sequence
    }

    /// Build an [`Event`] for `session_id` carrying `payload`, stamping it
    /// with the next sequence number and an RFC 3339 `timestamp`.
    pub fn create_event(&self, session_id: SessionId, timestamp: impl Into<String>, payload: EventPayload) -> Event {
        let sequence = self.next_sequence(&session_id);
        Event { session_id, timestamp: timestamp.into(), sequence, payload }
    }

    /// Reset the counter for `session_id` back to zero. Used when a session
    /// is detached and later re-attached under the same id, so a fresh
    /// history load does not collide with sequence numbers already sent to
    /// the remote client.
    pub fn reset_sequence(&self, session_id: &SessionId) {
        self.counters.lock().remove(session_id);
    }
}

impl Default for SequenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;
