// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent start/stop/status lifecycle specs

use crate::prelude::*;

#[test]
#[serial]
fn started_agent_answers_and_reports_status() {
    let agent = Agent::running("spec-agent");

    assert!(agent.socket().exists());
    agent.swarm().args(&["ping"]).passes().stdout_has("pong");
    agent
        .swarm()
        .args(&["status"])
        .passes()
        .stdout_has("Agent: spec-agent (standalone)")
        .stdout_has("No connections");
}

#[test]
#[serial]
fn json_status_describes_an_idle_agent() {
    let agent = Agent::running("spec-json");

    let status = agent.swarm().args(&["-o", "json", "status"]).passes().json();
    similar_asserts::assert_eq!(status["agent_name"], "spec-json");
    similar_asserts::assert_eq!(status["state"], "standalone");
    assert_eq!(status["connections"].as_array().map(Vec::len), Some(0));
    assert!(status["cache"]["root"].as_str().is_some_and(|r| r.ends_with("cache")));
}

#[test]
#[serial]
fn second_start_finds_the_running_agent() {
    let agent = Agent::running("spec-twice");
    agent.swarm().args(&["start"]).passes().stdout_has("Agent already running");
}

#[test]
#[serial]
fn stop_removes_the_socket() {
    let agent = Agent::running("spec-stop");

    agent.swarm().args(&["stop"]).passes().stdout_has("Agent stopping");
    agent.wait_for("socket removal", || !agent.socket().exists());
    agent.swarm().args(&["ping"]).fails_with(NOT_RUNNING);
}

#[test]
#[serial]
fn reload_picks_up_the_configuration_file() {
    let agent = Agent::running("spec-reload");
    let config = "agent_name = \"spec-reload\"\nstandalone = true\ncache_root = \"cache\"\n";
    std::fs::write(agent.state_dir().join("agent.toml"), format!("{config}local_cores = 7\n"))
        .unwrap();

    agent.swarm().args(&["reload"]).passes().stdout_has("Configuration reloaded");
    agent.swarm().args(&["ping"]).passes();
}

#[test]
#[serial]
fn broken_configuration_fails_startup() {
    let agent = Agent::configured("spec-broken");
    std::fs::write(agent.state_dir().join("agent.toml"), "local_cores = [").unwrap();

    agent.swarm().args(&["start"]).fails().stderr_has("Configuration error");
    assert!(!agent.socket().exists());
}
