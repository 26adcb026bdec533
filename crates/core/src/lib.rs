// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! agentbridge-core: canonical event protocol and shared types for the
//! agent-bridge daemon. No adapter, transport, or orchestration logic
//! lives here — only the data model every other crate speaks.

pub mod macros;

pub mod clock;
pub mod event;
pub mod ids;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{
    assess_risk, categorize_tool, describe_tool_call, AgentCapabilities, ApprovalCapabilities,
    ApprovalPreview, ContentBlock, EnvironmentContext, Event, EventPayload, FileOperationCapabilities,
    IntegrationMethod, Metadata, ModelInfo, ProjectInfo, ResourceCapabilities, RiskLevel, Role,
    RuntimeInfo, SequenceRegistry, SessionControlCapabilities, SessionError, SessionStatus,
    StreamingCapabilities, ToolCategory, UserInteractionCapabilities,
};
pub use ids::{MessageId, PartId, RequestId, SessionId, ToolCallId};
