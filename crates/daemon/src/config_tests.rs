// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.config_dir = dir.path().to_path_buf();
    config.daemon.port = 1234;
    config.machine.id = Some("m1".to_string());
    config.save().unwrap();

    let reloaded = Config::load(dir.path());
    assert_eq!(reloaded.daemon.port, 1234);
    assert_eq!(reloaded.machine.id.as_deref(), Some("m1"));
    assert_eq!(reloaded.api, config.api);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    assert_eq!(config.daemon.port, 9876);
    assert!(!config.machine.is_linked());
}

#[test]
fn corrupt_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "not valid = [[[ toml").unwrap();
    let config = Config::load(dir.path());
    assert_eq!(config.daemon.port, 9876);
}

#[test]
#[serial]
fn env_overrides_apply_on_top_of_file() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("PORT", "5555");
    let config = Config::load(dir.path());
    std::env::remove_var("PORT");
    assert_eq!(config.daemon.port, 5555);
}

#[cfg(unix)]
#[test]
fn save_sets_secure_permissions() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.config_dir = dir.path().join("nested");
    config.save().unwrap();
    let file_mode = std::fs::metadata(config.config_path()).unwrap().permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);
    let dir_mode = std::fs::metadata(config.config_dir()).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
}
