// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::EventPayload;

fn event_at(registry: &SequenceRegistry, session: &str) -> Event {
    registry.create_event(
        SessionId::from(session),
        "2026-07-28T00:00:00Z",
        EventPayload::SessionCompleted { summary: None },
    )
}

#[test]
fn sequence_numbers_start_at_zero_and_increment_gap_free() {
    let registry = SequenceRegistry::new();
    let first = event_at(&registry, "s1");
    let second = event_at(&registry, "s1");
    let third = event_at(&registry, "s1");
    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 1);
    assert_eq!(third.sequence, 2);
}

#[test]
fn sequences_are_independent_per_session() {
    let registry = SequenceRegistry::new();
    let a1 = event_at(&registry, "a");
    let b1 = event_at(&registry, "b");
    let a2 = event_at(&registry, "a");
    assert_eq!(a1.sequence, 0);
    assert_eq!(b1.sequence, 0);
    assert_eq!(a2.sequence, 1);
}

#[test]
fn reset_sequence_restarts_a_session_at_zero() {
    let registry = SequenceRegistry::new();
    event_at(&registry, "s1");
    event_at(&registry, "s1");
    registry.reset_sequence(&SessionId::from("s1"));
    let after_reset = event_at(&registry, "s1");
    assert_eq!(after_reset.sequence, 0);
}

#[test]
fn reset_sequence_on_unknown_session_is_a_no_op() {
    let registry = SequenceRegistry::new();
    registry.reset_sequence(&SessionId::from("never-seen"));
    let event = event_at(&registry, "never-seen");
    assert_eq!(event.sequence, 0);
}

#[test]
fn registries_are_independent_across_instances() {
    let a = SequenceRegistry::new();
    let b = SequenceRegistry::new();
    event_at(&a, "s1");
    let from_b = event_at(&b, "s1");
    assert_eq!(from_b.sequence, 0);
}
