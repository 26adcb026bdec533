//! CLI help and version output specs.

use crate::prelude::*;

#[test]
fn help_shows_usage() {
    cli().args(["--help"]).passes().stdout_has("Usage:");
}

#[test]
fn help_lists_subcommands() {
    cli()
        .args(["--help"])
        .passes()
        .stdout_has("start")
        .stdout_has("stop")
        .stdout_has("status")
        .stdout_has("link")
        .stdout_has("config");
}

#[test]
fn config_help_lists_get_and_set() {
    cli().args(["config", "--help"]).passes().stdout_has("get").stdout_has("set");
}

#[test]
fn no_args_is_an_error() {
    cli().fails();
}
