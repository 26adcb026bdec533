// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn write_then_read_round_trips_port() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("daemon.pid");
    write(&path, 9876).unwrap();
    assert_eq!(read(&path), Some(9876));
}

#[test]
fn read_missing_file_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(read(&dir.path().join("daemon.pid")), None);
}

#[test]
fn read_malformed_contents_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.pid");
    std::fs::write(&path, "not-a-port").unwrap();
    assert_eq!(read(&path), None);
}

#[test]
fn remove_tolerates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    remove(&dir.path().join("nonexistent.pid"));
}

#[cfg(unix)]
#[test]
fn write_sets_0600_permissions() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.pid");
    write(&path, 1).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}
