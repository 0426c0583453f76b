// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache maintenance specs

use crate::prelude::*;

#[test]
#[serial]
fn maintenance_runs_on_an_idle_agent() {
    let agent = Agent::running("spec-cache");

    for mode in ["validate", "age", "clear"] {
        agent.swarm().args(&["cache", mode]).passes().stdout_has("Cache: 0 channels");
    }
}

#[test]
#[serial]
fn cache_json_reports_the_summary() {
    let agent = Agent::running("spec-cache-json");

    let summary = agent.swarm().args(&["-o", "json", "cache", "age"]).passes().json();
    assert_eq!(summary["channels"], 0);
    assert_eq!(summary["job_folders"], 0);
}
