// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_command_frame() {
    let text = r#"{"type":"command","sessionId":"sess-1","command":{"type":"send_message","message":"hi"}}"#;
    let parsed: ClientMessage = serde_json::from_str(text).unwrap();
    match parsed {
        ClientMessage::Command { session_id, command } => {
            assert_eq!(session_id.as_str(), "sess-1");
            match Command::from(command) {
                Command::SendMessage { message } => assert_eq!(message, "hi"),
                other => panic!("unexpected command: {other:?}"),
            }
        }
        _ => panic!("expected Command variant"),
    }
}

#[test]
fn parses_approve_tool_call_frame() {
    let text = r#"{"type":"command","sessionId":"sess-1","command":{"type":"approve_tool_call","requestId":"req-1"}}"#;
    let parsed: ClientMessage = serde_json::from_str(text).unwrap();
    let ClientMessage::Command { command, .. } = parsed else { panic!("expected Command") };
    match Command::from(command) {
        Command::ApproveToolCall { request_id } => assert_eq!(request_id.as_str(), "req-1"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_start_session_frame() {
    let text = r#"{"type":"start_session","agent":"opencode","projectPath":"/repo","prompt":"fix it"}"#;
    let parsed: ClientMessage = serde_json::from_str(text).unwrap();
    match parsed {
        ClientMessage::StartSession { agent, project_path, prompt } => {
            assert_eq!(agent, "opencode");
            assert_eq!(project_path, "/repo");
            assert_eq!(prompt, "fix it");
        }
        _ => panic!("expected StartSession variant"),
    }
}

#[test]
fn rejects_unknown_message_type() {
    let text = r#"{"type":"not_a_real_type"}"#;
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    assert!(parsed.is_err());
}

#[test]
fn parses_get_sessions_and_get_capabilities() {
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"get_sessions"}"#).unwrap(),
        ClientMessage::GetSessions
    ));
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"get_capabilities"}"#).unwrap(),
        ClientMessage::GetCapabilities
    ));
}
