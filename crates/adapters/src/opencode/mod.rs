// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The OpenCode adapter: the reference agent integration this crate ships,
//! covering file-watch history/live projection, an HTTP/SSE fast path when
//! OpenCode's local server is reachable, and a child-process fallback.

mod adapter;
mod dedup;
mod driver;
mod http;
mod paths;
mod projection;
mod types;

pub use adapter::OpenCodeAdapter;
pub use driver::OpenCodeDriver;
pub use http::{OpenCodeClient, ServerInfo};
pub use paths::default_data_paths;
