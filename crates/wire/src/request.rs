// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use swarm_core::{ChannelFlags, Handle, JobGuid, JobSpecifications, Message, TaskSpecification};

/// What `MaintainCache` should do
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheMaintenance {
    /// Delete every cached file and job folder
    Clear,
    /// Re-hash every persistent channel
    Validate,
    /// Trim job folders and evict least-recently-used channels over quota
    Age,
}

/// Request from a local client to the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: u32 },

    /// Agent summary
    Status,

    /// Request agent shutdown
    Shutdown,

    /// Re-read the agent configuration
    ReloadConfig,

    MaintainCache { mode: CacheMaintenance },

    OpenConnection {
        process_id: u32,
        /// The connecting process launched (and owns) the agent
        #[serde(default)]
        process_is_owner: bool,
    },

    CloseConnection { handle: Handle },

    SendMessage { handle: Handle, message: Message },

    /// Wait up to `timeout_ms` for the next mailbox message
    GetMessage { handle: Handle, timeout_ms: u64 },

    /// Copy a file from disk into the persistent cache
    AddChannel { handle: Handle, full_path: PathBuf, name: String },

    TestChannel { handle: Handle, name: String },

    OpenChannel { handle: Handle, name: String, flags: ChannelFlags },

    CloseChannel { handle: Handle, channel: i32 },

    OpenJob { handle: Handle, job: JobGuid },

    BeginJobSpecification { handle: Handle, specs: JobSpecifications },

    AddTask { handle: Handle, tasks: Vec<TaskSpecification> },

    EndJobSpecification { handle: Handle },

    CloseJob { handle: Handle },
}

impl Request {
    /// Requests logged at debug level because clients poll them
    pub fn is_polling(&self) -> bool {
        matches!(self, Request::GetMessage { .. } | Request::Ping | Request::Status)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
