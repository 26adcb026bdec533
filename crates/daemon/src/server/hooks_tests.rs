// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;

#[tokio::test]
async fn register_then_resolve_delivers_decision() {
    let approvals = HookApprovals::new();
    let (request_id, rx) = approvals.register("Bash".to_string(), serde_json::json!({"command": "ls"}));
    assert_eq!(approvals.pending_count(), 1);

    assert!(approvals.resolve(&request_id, PermissionDecision::Allow));
    let decision = rx.await.unwrap();
    assert!(matches!(decision, PermissionDecision::Allow));
    assert_eq!(approvals.pending_count(), 0);
}

#[test]
fn resolve_unknown_request_id_returns_false() {
    let approvals = HookApprovals::new();
    let bogus = RequestId::from("does-not-exist".to_string());
    assert!(!approvals.resolve(&bogus, PermissionDecision::Deny));
}

#[test]
fn notifier_is_called_on_register() {
    let approvals = HookApprovals::new();
    let seen: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
    let seen_clone = seen.clone();
    approvals.set_notifier(Arc::new(move |_id, tool, _args| {
        seen_clone.lock().push(tool.to_string());
    }));

    approvals.register("Write".to_string(), serde_json::json!({}));
    assert_eq!(seen.lock().as_slice(), ["Write"]);
}

#[test]
fn forget_drops_without_resolving() {
    let approvals = HookApprovals::new();
    let (request_id, _rx) = approvals.register("Bash".to_string(), serde_json::json!({}));
    approvals.forget(&request_id);
    assert_eq!(approvals.pending_count(), 0);
    assert!(!approvals.resolve(&request_id, PermissionDecision::Allow));
}
