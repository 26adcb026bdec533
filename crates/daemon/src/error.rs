// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced by the daemon's own components (as opposed to
//! [`agentbridge_adapters::AdapterError`], which comes from an agent
//! adapter or session driver). See SPEC_FULL.md §7 for the recovery
//! policy attached to each kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tunnel already running")]
    TunnelAlreadyRunning,

    #[error("tunnel startup timeout")]
    TunnelTimeout,

    #[error("tunnel binary not installed and platform is unsupported: {0}")]
    TunnelUnsupportedPlatform(String),

    #[error("failed to install tunnel binary: {0}")]
    TunnelInstall(String),

    #[error("link request not found or expired")]
    LinkRequestGone,

    #[error("link code expired")]
    LinkExpired,

    #[error("remote API request failed: {0}")]
    RemoteApi(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Adapter(#[from] agentbridge_adapters::AdapterError),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
