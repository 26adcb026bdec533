// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the `agentbridge` CLI specs: a chainable command
//! builder plus an isolated config directory per test.

use std::path::PathBuf;

use assert_cmd::Command;

/// A fresh, isolated `AGENTAP_CONFIG_DIR` for one test. Dropped (and the
/// directory removed) at the end of the test.
pub struct Workspace {
    pub config_dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self { config_dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self) -> PathBuf {
        self.config_dir.path().to_path_buf()
    }

    /// Build an `agentbridge` invocation scoped to this workspace's config dir.
    pub fn cli(&self) -> Invocation {
        let mut cmd = Command::cargo_bin("agentbridge").expect("agentbridge binary");
        cmd.env("AGENTAP_CONFIG_DIR", self.path());
        cmd.env("NO_COLOR", "1");
        Invocation { cmd }
    }
}

/// Invocation-scoped version of `agentbridge` that doesn't need a
/// per-test config directory (e.g. `--help`, `--version`).
pub fn cli() -> Invocation {
    let mut cmd = Command::cargo_bin("agentbridge").expect("agentbridge binary");
    cmd.env("NO_COLOR", "1");
    Invocation { cmd }
}

pub struct Invocation {
    cmd: Command,
}

pub struct Finished {
    stdout: String,
    stderr: String,
}

impl Invocation {
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> Finished {
        let output = self.cmd.output().expect("spawn agentbridge");
        assert!(
            output.status.success(),
            "expected success, got {:?}\nstdout: {}\nstderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        Finished {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn fails(mut self) -> Finished {
        let output = self.cmd.output().expect("spawn agentbridge");
        assert!(!output.status.success(), "expected failure, got success");
        Finished {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl Finished {
    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(
            self.stdout.contains(needle),
            "expected stdout to contain {needle:?}, got: {}",
            self.stdout
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(
            self.stderr.contains(needle),
            "expected stderr to contain {needle:?}, got: {}",
            self.stderr
        );
        self
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }
}
