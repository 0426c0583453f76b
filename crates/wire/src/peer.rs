// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-to-agent calls.
//!
//! Every call names the shared connection handle. The side that receives a
//! call resolves the handle in its own connection table.

use serde::{Deserialize, Serialize};
use swarm_core::{AgentError, Handle, JobGuid, JobSpecifications, Message, TaskSpecification};

/// One framed call: version, optional shared token, and the request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerEnvelope {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request: PeerRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PeerRequest {
    /// Ask the callee to become a worker for `requesting_agent`
    OpenRemoteConnection {
        requesting_agent: String,
        handle: Handle,
        #[serde(default)]
        assigned: bool,
        /// Coordinator assignment time, epoch milliseconds
        #[serde(default)]
        assigned_time: u64,
    },

    /// Callee confirms the pending handle back to the caller
    ConfirmRemoteConnection { handle: Handle },

    CloseConnection { handle: Handle },

    TestConnection { handle: Handle },

    SendMessage { handle: Handle, message: Message },

    /// Push a file into the callee's cache
    SendChannel {
        handle: Handle,
        name: String,
        #[serde(default)]
        job: Option<JobGuid>,
        #[serde(with = "crate::bytes")]
        data: Vec<u8>,
    },

    /// Ask the callee to push a file back with `SendChannel`
    RequestChannel {
        handle: Handle,
        name: String,
        #[serde(default)]
        job: Option<JobGuid>,
    },

    /// Compare the callee's copy against `hash` (hex SHA-1)
    ValidateChannel { handle: Handle, name: String, hash: String },

    OpenJob { handle: Handle, job: JobGuid },

    BeginJobSpecification { handle: Handle, specs: JobSpecifications },

    AddTask { handle: Handle, tasks: Vec<TaskSpecification> },

    EndJobSpecification { handle: Handle },

    CloseJob { handle: Handle },
}

impl PeerRequest {
    pub fn handle(&self) -> Handle {
        match self {
            PeerRequest::OpenRemoteConnection { handle, .. }
            | PeerRequest::ConfirmRemoteConnection { handle }
            | PeerRequest::CloseConnection { handle }
            | PeerRequest::TestConnection { handle }
            | PeerRequest::SendMessage { handle, .. }
            | PeerRequest::SendChannel { handle, .. }
            | PeerRequest::RequestChannel { handle, .. }
            | PeerRequest::ValidateChannel { handle, .. }
            | PeerRequest::OpenJob { handle, .. }
            | PeerRequest::BeginJobSpecification { handle, .. }
            | PeerRequest::AddTask { handle, .. }
            | PeerRequest::EndJobSpecification { handle }
            | PeerRequest::CloseJob { handle } => *handle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PeerResponse {
    Ok,
    /// `OpenRemoteConnection` outcome. `None` means refused without error.
    Opened { handle: Option<Handle> },
    Flag { value: bool },
    Error { error: AgentError },
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
