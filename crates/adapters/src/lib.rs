// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent adapters: per-agent-kind façades that locate, enumerate, watch,
//! attach to, and start sessions for a locally running coding assistant.
//!
//! This crate defines the [`AgentAdapter`]/[`SessionDriver`] contract
//! (`contract` module) plus one concrete implementation, the OpenCode
//! adapter (`opencode` module), specified as the reference integration.
//! Other agents (Claude Code, Codex, Aider) implement the same contract
//! against their own on-disk format but are out of scope here.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod contract;
pub mod opencode;

pub use contract::{
    AdapterError, AgentDataPaths, Command, DiscoveredServer, DiscoveredSession, EventListener,
    ListenerHandle, SessionDriver, WatchEvent, WatchEventKind, WatchHandle,
};
pub use contract::AgentAdapter;
