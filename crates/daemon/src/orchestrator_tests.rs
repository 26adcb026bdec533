// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use agentbridge_core::ContentBlock;

use super::*;
use crate::config::Config;

fn text_blocks(s: &str) -> Vec<ContentBlock> {
    vec![ContentBlock::text(s)]
}

#[test]
fn truncate_keeps_short_strings_untouched() {
    assert_eq!(truncate_with_ellipsis("hello", 100), "hello");
}

#[test]
fn truncate_adds_ellipsis_past_the_limit() {
    let input = "A".repeat(150);
    let result = truncate_with_ellipsis(&input, 100);
    assert_eq!(result, format!("{}...", "A".repeat(100)));
}

#[test]
fn truncate_last_message_to_two_hundred_chars() {
    let input = "B".repeat(250);
    let result = truncate_with_ellipsis(&input, LAST_MESSAGE_MAX_CHARS);
    assert_eq!(result, format!("{}...", "B".repeat(200)));
}

#[test]
fn strip_known_tags_removes_paired_system_reminder() {
    let input = "<system-reminder>ctx</system-reminder>Hello";
    assert_eq!(strip_known_tags(input), "Hello");
}

#[test]
fn strip_known_tags_consumes_orphaned_tag_to_end_of_string() {
    let input = "<system-reminder>ctx";
    assert_eq!(strip_known_tags(input), "");
}

#[test]
fn strip_known_tags_removes_paired_antml_prefixed_tag() {
    let input = "<antml:function_calls>x</antml:function_calls>Hello";
    assert_eq!(strip_known_tags(input), "Hello");
}

#[test]
fn strip_known_tags_consumes_orphaned_antml_prefixed_tag_to_end_of_string() {
    let input = "Hello<antml:invoke>still going";
    assert_eq!(strip_known_tags(input), "Hello");
}

#[test]
fn strip_known_tags_leaves_unrelated_tags_untouched() {
    let input = "Check the <Button>click handler</Button> bug";
    assert_eq!(strip_known_tags(input), input);
}

#[test]
fn derive_session_name_trims_and_truncates() {
    let name = derive_session_name(&text_blocks("  fix the login bug  "));
    assert_eq!(name.as_deref(), Some("fix the login bug"));
}

#[test]
fn derive_session_name_is_none_for_tag_only_message() {
    let name = derive_session_name(&text_blocks("<system-reminder>ctx</system-reminder>"));
    assert_eq!(name, None);
}

#[test]
fn derive_session_name_truncates_at_one_hundred_chars() {
    let input = "A".repeat(150);
    let name = derive_session_name(&text_blocks(&input));
    assert_eq!(name, Some(format!("{}...", "A".repeat(100))));
}

fn orchestrator_with_no_adapters() -> Arc<Orchestrator> {
    let mut config = Config::default();
    config.agents.enabled = vec!["nothing-installed".to_string()];
    Orchestrator::new(config, PathBuf::from("/tmp/agentbridge-test-home"), true)
}

#[tokio::test]
async fn on_auth_unlinked_always_succeeds_as_local_user() {
    let orchestrator = orchestrator_with_no_adapters();
    let result = orchestrator.on_auth("anything").await;
    assert!(result.valid);
    assert_eq!(result.user_id.as_deref(), Some("local-user"));
}

#[tokio::test]
async fn get_sessions_and_capabilities_are_empty_with_no_adapters_loaded() {
    let orchestrator = orchestrator_with_no_adapters();
    assert_eq!(orchestrator.get_sessions().await, serde_json::json!([]));
    assert_eq!(orchestrator.get_capabilities().await, serde_json::json!({}));
}

#[tokio::test]
async fn on_start_session_fails_for_unknown_agent() {
    let orchestrator = orchestrator_with_no_adapters();
    let result = orchestrator
        .on_start_session("opencode".to_string(), "/tmp/project".to_string(), "hi".to_string())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn on_terminate_session_fails_for_unknown_session() {
    let orchestrator = orchestrator_with_no_adapters();
    let result = orchestrator.on_terminate_session(SessionId::new("missing")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn get_session_history_fails_for_unknown_session() {
    let orchestrator = orchestrator_with_no_adapters();
    let result = orchestrator.get_session_history(SessionId::new("missing")).await;
    assert!(result.is_err());
}

#[test]
fn apply_event_sets_session_name_from_first_user_message() {
    let mut session = DaemonSession {
        id: SessionId::new("s1"),
        agent: "opencode".to_string(),
        machine_id: "local".to_string(),
        project_path: "/p".to_string(),
        project_name: "p".to_string(),
        status: SessionStatus::Running,
        session_name: None,
        last_message: None,
        model: None,
        created_at_ms: 0,
        last_activity_ms: 0,
        mode: "default".to_string(),
    };

    apply_event_to_session(
        &mut session,
        &EventPayload::MessageComplete {
            message_id: agentbridge_core::MessageId::new("m1"),
            role: Role::User,
            content: text_blocks("please fix the bug"),
            model: None,
            stop_reason: None,
        },
    );

    assert_eq!(session.session_name.as_deref(), Some("please fix the bug"));
}

#[test]
fn apply_event_sets_last_message_from_assistant_reply() {
    let mut session = DaemonSession {
        id: SessionId::new("s1"),
        agent: "opencode".to_string(),
        machine_id: "local".to_string(),
        project_path: "/p".to_string(),
        project_name: "p".to_string(),
        status: SessionStatus::Running,
        session_name: Some("already set".to_string()),
        last_message: None,
        model: None,
        created_at_ms: 0,
        last_activity_ms: 0,
        mode: "default".to_string(),
    };

    apply_event_to_session(
        &mut session,
        &EventPayload::MessageComplete {
            message_id: agentbridge_core::MessageId::new("m2"),
            role: Role::Assistant,
            content: text_blocks("done"),
            model: None,
            stop_reason: None,
        },
    );

    assert_eq!(session.last_message.as_deref(), Some("done"));
    // A second user message must not overwrite the name already derived.
    apply_event_to_session(
        &mut session,
        &EventPayload::MessageComplete {
            message_id: agentbridge_core::MessageId::new("m3"),
            role: Role::User,
            content: text_blocks("another message"),
            model: None,
            stop_reason: None,
        },
    );
    assert_eq!(session.session_name.as_deref(), Some("already set"));
}
