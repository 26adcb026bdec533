//! `agentbridge status` specs: no daemon has ever run against a fresh
//! config directory, so it must report "not running" rather than error.

use crate::prelude::*;

#[test]
fn status_reports_not_running_for_a_fresh_workspace() {
    let workspace = Workspace::new();
    workspace.cli().args(["status"]).passes().stdout_has("not running");
}

#[test]
fn status_json_reports_not_running() {
    let workspace = Workspace::new();
    workspace
        .cli()
        .args(["status", "--format", "json"])
        .passes()
        .stdout_has("\"status\"")
        .stdout_has("not_running");
}

#[test]
fn stop_on_a_fresh_workspace_is_a_no_op() {
    let workspace = Workspace::new();
    workspace.cli().args(["stop"]).passes().stdout_has("not running");
}
