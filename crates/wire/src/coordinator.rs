// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator directory calls

use serde::{Deserialize, Serialize};
use swarm_core::AgentInfo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CoordinatorRequest {
    GetUniqueHandle,
    /// Agents advertising `group`, or all when `None`
    GetAvailableAgents {
        #[serde(default)]
        group: Option<String>,
    },
    Ping { info: AgentInfo },
    RestartAgentGroup { group: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CoordinatorResponse {
    Ok,
    Handle { handle: i32 },
    Agents { agents: Vec<AgentInfo> },
    /// Heartbeat reply; `restart` asks the agent to restart itself
    Pong {
        #[serde(default)]
        restart: bool,
    },
    Error { message: String },
}
