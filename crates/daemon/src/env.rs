// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use swarm_core::AgentConfig;

use crate::lifecycle::LifecycleError;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn flag(key: &str) -> Option<bool> {
    parse_flag(&std::env::var(key).ok()?)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Resolve state directory: SWARM_STATE_DIR > XDG_STATE_HOME/swarm > ~/.local/state/swarm
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = non_empty("SWARM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("swarm"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/swarm"))
}

/// Default IPC timeout
pub fn ipc_timeout() -> Duration {
    parsed::<u64>("SWARM_IPC_TIMEOUT_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Interval of the maintenance tick (default 250ms)
pub fn tick_interval() -> Duration {
    parsed::<u64>("SWARM_TICK_MS")
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(250))
}

/// Shared secret peers present in every call. Unset means peers are
/// trusted by network reachability alone.
pub fn peer_token() -> Option<String> {
    non_empty("SWARM_PEER_TOKEN")
}

/// Apply `SWARM_*` overrides on top of the file configuration
pub fn apply_overrides(mut config: AgentConfig) -> AgentConfig {
    if let Some(name) = non_empty("SWARM_AGENT_NAME") {
        config.agent_name = name;
    }
    if let Some(group) = non_empty("SWARM_GROUP_NAME") {
        config.group_name = group;
    }
    if let Some(root) = non_empty("SWARM_CACHE_ROOT") {
        config.cache_root = PathBuf::from(root);
    }
    if let Some(coordinator) = non_empty("SWARM_COORDINATOR") {
        config.coordinator = Some(coordinator);
    }
    if let Some(ip) = non_empty("SWARM_ADVERTISE_IP") {
        config.advertise_ip = ip;
    }
    if let Some(port) = parsed("SWARM_PEER_PORT") {
        config.peer_port = port;
    }
    if let Some(cores) = parsed("SWARM_LOCAL_CORES") {
        config.local_cores = cores;
    }
    if let Some(cores) = parsed("SWARM_REMOTE_CORES") {
        config.remote_cores = cores;
    }
    if let Some(standalone) = flag("SWARM_STANDALONE") {
        config.standalone = standalone;
    }
    config
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
