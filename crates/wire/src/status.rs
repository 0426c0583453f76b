// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status summaries reported to the CLI

use serde::{Deserialize, Serialize};
use swarm_core::{AgentState, Handle, JobGuid, JobState, SuccessState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub handle: Handle,
    pub kind: ConnectionKind,
    pub state: String,
    /// Process id for local connections, agent name for remote ones
    pub peer: String,
    #[serde(default)]
    pub parent: Option<Handle>,
    #[serde(default)]
    pub job: Option<JobGuid>,
    pub reservations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobEntry {
    pub guid: JobGuid,
    pub owner: Handle,
    pub owner_is_instigator: bool,
    pub state: JobState,
    pub success: SuccessState,
    pub pending: usize,
    pub running: usize,
    pub retired: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSummary {
    pub root: String,
    pub channels: usize,
    pub bytes: u64,
    pub job_folders: usize,
    pub hashes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub agent_name: String,
    pub state: AgentState,
    pub uptime_secs: u64,
    pub coordinator_responding: bool,
    pub connections: Vec<ConnectionEntry>,
    pub jobs: Vec<JobEntry>,
    pub cache: CacheSummary,
}
