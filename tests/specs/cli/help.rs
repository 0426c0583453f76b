// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs

use crate::prelude::*;

#[test]
fn help_shows_usage() {
    cli().args(&["--help"]).passes().stdout_has("Usage:").stdout_has("status");
}

#[test]
fn no_subcommand_prints_usage_and_fails() {
    cli().fails().stderr_has("Usage:");
}

#[test]
fn cache_help_lists_maintenance_modes() {
    cli()
        .args(&["cache", "--help"])
        .passes()
        .stdout_has("clear")
        .stdout_has("validate")
        .stdout_has("age");
}

#[test]
fn commands_needing_the_agent_report_it_missing() {
    for command in [&["status"][..], &["ping"], &["reload"], &["cache", "age"]] {
        cli().args(command).fails_with(NOT_RUNNING).stderr_has("agent not running");
    }
}

#[test]
fn stop_without_an_agent_is_not_an_error() {
    cli().args(&["stop"]).passes().stdout_has("Agent not running");
}

#[test]
fn version_works_without_an_agent() {
    let run = cli().args(&["-o", "json", "version"]).passes();
    let json = run.json();
    assert!(json["version"].is_string(), "{}", run.stdout());
    assert!(json["agent_protocol"].is_null());
}
