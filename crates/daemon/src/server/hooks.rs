// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook-approvals subsystem: the long-poll counterpart to the injected
//! `pre-tool-use.sh` script (`crate::hooks`). A hook blocks on
//! `POST /api/hooks/approve` until a remote client resolves it or the
//! request times out, at which point the hook falls back to the agent's
//! own native prompt. SPEC_FULL.md §4.10, §4.9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentbridge_core::RequestId;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

/// How long a hook waits for a decision before defaulting to `ask`.
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(290);

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

pub struct PendingApproval {
    pub tool: String,
    pub args: Value,
    resolver: oneshot::Sender<PermissionDecision>,
}

/// Notified whenever a hook registers a new pending approval, so the
/// orchestrator can broadcast it to connected remote clients as an
/// `approval:requested` event.
pub type ApprovalNotifier = Arc<dyn Fn(RequestId, &str, &Value) + Send + Sync>;

#[derive(Default)]
pub struct HookApprovals {
    pending: Mutex<HashMap<RequestId, PendingApproval>>,
    notifier: Mutex<Option<ApprovalNotifier>>,
}

impl HookApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notifier(&self, notifier: ApprovalNotifier) {
        *self.notifier.lock() = Some(notifier);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Register a new approval request and notify listeners. Returns the
    /// minted request id and a receiver that resolves once a client
    /// calls [`HookApprovals::resolve`] or the caller times it out.
    pub fn register(&self, tool: String, args: Value) -> (RequestId, oneshot::Receiver<PermissionDecision>) {
        let request_id = RequestId::from(Uuid::new_v4().to_string());
        let (tx, rx) = oneshot::channel();

        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier(request_id.clone(), &tool, &args);
        }

        self.pending.lock().insert(
            request_id.clone(),
            PendingApproval { tool, args, resolver: tx },
        );
        (request_id, rx)
    }

    /// Resolve a pending approval. Returns `false` if no approval with
    /// this id is outstanding (already resolved, already timed out, or
    /// never existed).
    pub fn resolve(&self, request_id: &RequestId, decision: PermissionDecision) -> bool {
        let Some(pending) = self.pending.lock().remove(request_id) else {
            return false;
        };
        pending.resolver.send(decision).is_ok()
    }

    /// Drop a pending approval without resolving it, e.g. once the
    /// long-poll handler's own timeout fires.
    pub fn forget(&self, request_id: &RequestId) {
        self.pending.lock().remove(request_id);
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod hooks_tests;
