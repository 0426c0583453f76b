// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use swarm_core::{AgentError, AgentResult, Handle, JobGuid, Message};

use super::{CacheSummary, StatusSummary};

/// What a client learns when its connection opens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenConnectionReply {
    pub handle: Handle,
    pub agent_process_id: u32,
    pub cache_root: PathBuf,
    /// Job this process was spawned for, if any
    #[serde(default)]
    pub job: Option<JobGuid>,
    /// False when the parent job is owned by another agent
    pub is_pure_local: bool,
}

/// Response from the agent to a local client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: u32 },

    /// Agent is shutting down
    ShuttingDown,

    /// Operation failed; `code` is the negative result code
    Error { code: i32, error: AgentError },

    Connected { reply: OpenConnectionReply },

    /// Next mailbox message, `None` on timeout
    Message { message: Option<Message> },

    Channel { channel: i32, path: PathBuf },

    ChannelPresent { present: bool },

    Status { status: StatusSummary },

    Cache { summary: CacheSummary },
}

impl Response {
    pub fn error(error: AgentError) -> Self {
        Response::Error { code: error.code(), error }
    }

    /// Map an operation result, turning errors into `Response::Error`
    pub fn from_result<T>(result: AgentResult<T>, ok: impl FnOnce(T) -> Response) -> Self {
        match result {
            Ok(v) => ok(v),
            Err(e) => Response::error(e),
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
