//! `agentbridge config get|set` specs.

use crate::prelude::*;

#[test]
fn get_returns_the_default_port() {
    let workspace = Workspace::new();
    workspace.cli().args(["config", "get", "daemon.port"]).passes().stdout_has("9876");
}

#[test]
fn set_then_get_round_trips() {
    let workspace = Workspace::new();
    workspace.cli().args(["config", "set", "daemon.port", "4242"]).passes();
    workspace.cli().args(["config", "get", "daemon.port"]).passes().stdout_has("4242");
}

#[test]
fn set_a_string_field_round_trips() {
    let workspace = Workspace::new();
    workspace
        .cli()
        .args(["config", "set", "api.url", "https://example.test"])
        .passes();
    workspace
        .cli()
        .args(["config", "get", "api.url"])
        .passes()
        .stdout_has("https://example.test");
}

#[test]
fn get_an_unknown_key_fails() {
    let workspace = Workspace::new();
    workspace.cli().args(["config", "get", "nonexistent.field"]).fails();
}

#[test]
fn set_an_unknown_key_fails() {
    let workspace = Workspace::new();
    workspace.cli().args(["config", "set", "nonexistent.field", "x"]).fails();
}

#[test]
fn get_json_format_wraps_the_value() {
    let workspace = Workspace::new();
    workspace
        .cli()
        .args(["config", "get", "daemon.port", "--format", "json"])
        .passes()
        .stdout_has("\"key\"")
        .stdout_has("\"value\"");
}
