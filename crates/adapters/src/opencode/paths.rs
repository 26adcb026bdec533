// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed on-disk locations for the OpenCode adapter. Same XDG-like layout
//! on every platform: `<home>/.local/share/opencode/...` — OpenCode does
//! not follow platform-native config/data directory conventions, so we
//! don't reach for `dirs::config_dir` etc. here.

use crate::contract::AgentDataPaths;
use std::path::{Path, PathBuf};

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_storage_root() -> PathBuf {
    home_dir().join(".local").join("share").join("opencode").join("storage")
}

pub fn default_data_paths() -> AgentDataPaths {
    let home = home_dir();
    let base = home.join(".local").join("share").join("opencode");
    AgentDataPaths {
        sessions_root: base.join("storage").join("session"),
        config_dir: home.join(".config").join("opencode"),
        logs_dir: base.join("log"),
    }
}

pub fn sessions_root(storage_root: &Path) -> PathBuf {
    storage_root.join("session")
}

pub fn message_dir(storage_root: &Path, session_id: &str) -> PathBuf {
    storage_root.join("message").join(session_id)
}

pub fn part_dir(storage_root: &Path, message_id: &str) -> PathBuf {
    storage_root.join("part").join(message_id)
}
