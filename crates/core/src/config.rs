// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration.
//!
//! Read once at startup (and again on an explicit reload request). The
//! engine never mutates it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name this agent registers under
    pub agent_name: String,
    /// Group this agent advertises
    pub group_name: String,
    /// Name patterns of agents we may recruit (space, comma or semicolon separated)
    pub allowed_remote_agent_names: String,
    /// Coordinator group to recruit from
    pub allowed_remote_agent_group: String,
    pub cache_root: PathBuf,
    /// Cores offered to jobs instigated on this machine
    pub local_cores: u32,
    /// Cores offered to jobs from other agents
    pub remote_cores: u32,
    /// Bound for remote calls, in seconds
    pub remote_timeout_secs: u64,
    /// Grace period before a closed job's process is killed, in seconds
    pub job_executable_timeout_secs: u64,
    /// Persistent cache size limit, in bytes
    pub cache_quota_bytes: u64,
    /// Job scratch folders kept by cache aging
    pub retained_job_folders: usize,
    pub standalone: bool,
    /// Prefer remote workers for the instigator's tasks
    pub avoid_local_execution: bool,
    pub replay_last_distribution: bool,
    /// `host:port` of the coordinator, none for standalone discovery
    pub coordinator: Option<String>,
    /// Address advertised to peers
    pub advertise_ip: String,
    pub peer_port: u16,
    /// Captured stdout/stderr lines per job executable
    pub max_job_log_lines: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1);
        Self {
            agent_name: "localhost".to_string(),
            group_name: "Default".to_string(),
            allowed_remote_agent_names: "*".to_string(),
            allowed_remote_agent_group: "Default".to_string(),
            cache_root: PathBuf::from("SwarmCache"),
            local_cores: cores,
            remote_cores: cores,
            remote_timeout_secs: 10,
            job_executable_timeout_secs: 60,
            cache_quota_bytes: 10 * 1024 * 1024 * 1024,
            retained_job_folders: 5,
            standalone: false,
            avoid_local_execution: false,
            replay_last_distribution: false,
            coordinator: None,
            advertise_ip: "127.0.0.1".to_string(),
            peer_port: 8008,
            max_job_log_lines: 1000,
        }
    }
}

impl AgentConfig {
    crate::setters! {
        into {
            agent_name: String,
            group_name: String,
            allowed_remote_agent_names: String,
            allowed_remote_agent_group: String,
            cache_root: PathBuf,
            advertise_ip: String,
        }
        set {
            local_cores: u32,
            remote_cores: u32,
            remote_timeout_secs: u64,
            job_executable_timeout_secs: u64,
            cache_quota_bytes: u64,
            retained_job_folders: usize,
            standalone: bool,
            avoid_local_execution: bool,
            replay_last_distribution: bool,
            peer_port: u16,
        }
        option {
            coordinator: String,
        }
    }

    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }

    pub fn job_executable_timeout(&self) -> Duration {
        Duration::from_secs(self.job_executable_timeout_secs)
    }

    pub fn agent_passes_filter(&self, name: &str) -> bool {
        name_passes_filter(name, &self.allowed_remote_agent_names)
    }
}

/// Match an agent name against a filter list.
///
/// Entries are separated by spaces, commas or semicolons and compared
/// case-insensitively. A trailing `*` makes the entry a prefix match, so a
/// lone `*` admits everyone.
pub fn name_passes_filter(name: &str, filter: &str) -> bool {
    let name = name.to_lowercase();
    filter
        .split([' ', ',', ';'])
        .filter(|entry| !entry.is_empty())
        .map(str::to_lowercase)
        .any(|entry| match entry.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == entry,
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
