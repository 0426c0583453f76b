// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch of calls from other agents.
//!
//! Every call names the shared connection handle. Job calls arrive on the
//! worker from its instigator and act on behalf of that remote owner.

use super::Agent;
use swarm_core::{AgentError, AgentResult};
use swarm_wire::{PeerRequest, PeerResponse};

fn ok(result: AgentResult<()>) -> PeerResponse {
    match result {
        Ok(()) => PeerResponse::Ok,
        Err(error) => PeerResponse::Error { error },
    }
}

fn flag(result: AgentResult<bool>) -> PeerResponse {
    match result {
        Ok(value) => PeerResponse::Flag { value },
        Err(error) => PeerResponse::Error { error },
    }
}

impl Agent {
    pub async fn handle_peer_request(&self, request: PeerRequest) -> PeerResponse {
        match request {
            PeerRequest::OpenRemoteConnection {
                requesting_agent,
                handle,
                assigned,
                assigned_time,
            } => match self
                .manager
                .open_remote(&requesting_agent, handle, assigned, assigned_time)
                .await
            {
                Ok(handle) => PeerResponse::Opened { handle },
                Err(error) => PeerResponse::Error { error },
            },

            PeerRequest::ConfirmRemoteConnection { handle } => {
                flag(self.manager.confirm_remote(handle))
            }

            PeerRequest::CloseConnection { handle } => {
                // The peer has already let go; a connection we never had is fine
                match self.manager.close_with(handle, false).await {
                    Ok(()) | Err(AgentError::ConnectionNotFound) => PeerResponse::Ok,
                    Err(error) => PeerResponse::Error { error },
                }
            }

            PeerRequest::TestConnection { handle } => flag(
                self.connections
                    .require(handle)
                    .map(|c| c.state() == crate::connection::ConnectionState::Connected),
            ),

            PeerRequest::SendMessage { handle, message } => {
                ok(self.router.receive_from_peer(handle, message))
            }

            PeerRequest::SendChannel { handle, name, job, data } => {
                ok(self.channels.receive_channel(handle, &name, job, &data))
            }

            PeerRequest::RequestChannel { handle, name, job } => {
                ok(self.channels.send_requested(handle, &name, job).await)
            }

            PeerRequest::ValidateChannel { handle, name, hash } => {
                flag(self.connections.require(handle).map(|_| {
                    self.channels.validate_channel(&name, &hash)
                }))
            }

            PeerRequest::OpenJob { handle, job } => ok(self.open_job(handle, job).await),

            PeerRequest::BeginJobSpecification { handle, specs } => {
                ok(self.begin_job_specification(handle, specs).await)
            }

            PeerRequest::AddTask { handle, tasks } => ok(self.add_tasks(handle, tasks)),

            PeerRequest::EndJobSpecification { handle } => {
                ok(self.end_job_specification(handle).await)
            }

            PeerRequest::CloseJob { handle } => ok(self.close_job(handle).await),
        }
    }
}
