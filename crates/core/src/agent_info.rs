// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What an agent advertises to the coordinator and to its peers

use serde::{Deserialize, Serialize};

/// Availability advertised in the coordinator heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Available,
    Working,
    Busy,
    Standalone,
    Closed,
}

crate::simple_display! {
    AgentState {
        Available => "available",
        Working => "working",
        Busy => "busy",
        Standalone => "standalone",
        Closed => "closed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub user: String,
    /// Address other agents reach this agent on
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub state: AgentState,
    #[serde(default)]
    pub working_for: Option<String>,
    #[serde(default)]
    pub local_cores: u32,
    #[serde(default)]
    pub remote_cores: u32,
    /// Set by the coordinator when it directs this agent to a particular instigator
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assigned_time: Option<u64>,
}

impl AgentInfo {
    /// `ip:port` for the peer listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
