use super::*;

#[test]
fn text_part_fires_once() {
    let mut t = DedupTable::new();
    assert!(t.mark_text("p1"));
    assert!(!t.mark_text("p1"));
}

#[test]
fn reasoning_start_fires_once_delta_follows_text() {
    let mut t = DedupTable::new();
    let (start, delta, complete) = t.mark_reasoning("p1", false, false);
    assert!(start);
    assert!(!delta);
    assert!(!complete);

    let (start, delta, complete) = t.mark_reasoning("p1", true, false);
    assert!(!start);
    assert!(delta);
    assert!(!complete);

    // Second delta with text again should not re-fire.
    let (start, delta, complete) = t.mark_reasoning("p1", true, false);
    assert!(!start);
    assert!(!delta);
    assert!(!complete);

    let (_, _, complete) = t.mark_reasoning("p1", true, true);
    assert!(complete);
    let (_, _, complete) = t.mark_reasoning("p1", true, true);
    assert!(!complete);
}

#[test]
fn tool_lifecycle_transitions_once_each() {
    let mut t = DedupTable::new();
    assert_eq!(t.advance_tool("t1", ToolPhase::Pending), Some(ToolPhase::Pending));
    assert_eq!(t.advance_tool("t1", ToolPhase::Pending), None);
    assert_eq!(t.advance_tool("t1", ToolPhase::Running), Some(ToolPhase::Running));
    assert_eq!(t.advance_tool("t1", ToolPhase::Running), None);
    assert_eq!(t.advance_tool("t1", ToolPhase::Completed), Some(ToolPhase::Completed));
    assert_eq!(t.advance_tool("t1", ToolPhase::Completed), None);
}

#[test]
fn step_finish_fires_once() {
    let mut t = DedupTable::new();
    assert!(t.mark_step_finish("p1"));
    assert!(!t.mark_step_finish("p1"));
}

#[test]
fn environment_info_fires_once_across_whole_session() {
    let mut t = DedupTable::new();
    assert!(t.mark_environment_info());
    assert!(!t.mark_environment_info());
}

#[test]
fn message_complete_idempotent() {
    let mut t = DedupTable::new();
    assert!(!t.message_completed("m1"));
    assert!(t.mark_message_complete("m1"));
    assert!(t.message_completed("m1"));
    assert!(!t.mark_message_complete("m1"));
}
