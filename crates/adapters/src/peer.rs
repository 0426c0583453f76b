// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer agent adapter.
//!
//! A peer is another agent reached over the typed [`PeerRequest`] protocol.
//! Implementations only provide [`AgentPeer::call`]; the typed operations are
//! provided methods that check the response shape.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{AgentError, AgentInfo, Handle, JobGuid, JobSpecifications, Message};
use swarm_core::TaskSpecification;
use swarm_wire::{read_frame, write_frame, PeerEnvelope, PeerRequest, PeerResponse};
use swarm_wire::{ProtocolError, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::net::TcpStream;

/// Floor for channel transfer calls, which move whole files
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("peer protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("peer returned error: {0}")]
    Remote(AgentError),

    #[error("unexpected peer response: {0}")]
    Unexpected(String),
}

impl PeerError {
    /// Error to report to a local client for a failed peer call
    pub fn to_agent_error(&self) -> AgentError {
        match self {
            PeerError::Remote(e) => e.clone(),
            PeerError::Unreachable { .. }
            | PeerError::Protocol(ProtocolError::ConnectionClosed) => {
                AgentError::ConnectionDisconnected
            }
            other => AgentError::internal(other),
        }
    }
}

fn expect_ok(response: PeerResponse) -> Result<(), PeerError> {
    match response {
        PeerResponse::Ok => Ok(()),
        other => Err(PeerError::Unexpected(format!("{other:?}"))),
    }
}

fn expect_flag(response: PeerResponse) -> Result<bool, PeerError> {
    match response {
        PeerResponse::Flag { value } => Ok(value),
        other => Err(PeerError::Unexpected(format!("{other:?}"))),
    }
}

/// Adapter for one remote agent
#[async_trait]
pub trait AgentPeer: Send + Sync + 'static {
    /// Where the peer lives, for logging
    fn address(&self) -> String;

    /// Perform one call. `PeerResponse::Error` must be mapped to
    /// [`PeerError::Remote`] by the implementation.
    async fn call(&self, request: PeerRequest) -> Result<PeerResponse, PeerError>;

    /// Cheap reachability probe of the peer's host
    async fn ping_host(&self) -> bool;

    /// Ask the peer to become a worker. `Ok(None)` means it refused
    /// without error (busy, filtered, or stale assignment).
    async fn open_remote_connection(
        &self,
        requesting_agent: &str,
        handle: Handle,
        assigned: bool,
        assigned_time: u64,
    ) -> Result<Option<Handle>, PeerError> {
        let request = PeerRequest::OpenRemoteConnection {
            requesting_agent: requesting_agent.to_string(),
            handle,
            assigned,
            assigned_time,
        };
        match self.call(request).await? {
            PeerResponse::Opened { handle } => Ok(handle),
            other => Err(PeerError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn confirm_remote_connection(&self, handle: Handle) -> Result<bool, PeerError> {
        expect_flag(self.call(PeerRequest::ConfirmRemoteConnection { handle }).await?)
    }

    async fn close_connection(&self, handle: Handle) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::CloseConnection { handle }).await?)
    }

    async fn test_connection(&self, handle: Handle) -> Result<bool, PeerError> {
        expect_flag(self.call(PeerRequest::TestConnection { handle }).await?)
    }

    async fn send_message(&self, handle: Handle, message: Message) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::SendMessage { handle, message }).await?)
    }

    async fn send_channel(
        &self,
        handle: Handle,
        name: &str,
        job: Option<JobGuid>,
        data: Vec<u8>,
    ) -> Result<(), PeerError> {
        let request = PeerRequest::SendChannel { handle, name: name.to_string(), job, data };
        expect_ok(self.call(request).await?)
    }

    async fn request_channel(
        &self,
        handle: Handle,
        name: &str,
        job: Option<JobGuid>,
    ) -> Result<(), PeerError> {
        let request = PeerRequest::RequestChannel { handle, name: name.to_string(), job };
        expect_ok(self.call(request).await?)
    }

    async fn validate_channel(
        &self,
        handle: Handle,
        name: &str,
        hash: &str,
    ) -> Result<bool, PeerError> {
        let request =
            PeerRequest::ValidateChannel { handle, name: name.to_string(), hash: hash.to_string() };
        expect_flag(self.call(request).await?)
    }

    async fn open_job(&self, handle: Handle, job: JobGuid) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::OpenJob { handle, job }).await?)
    }

    async fn begin_job_specification(
        &self,
        handle: Handle,
        specs: JobSpecifications,
    ) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::BeginJobSpecification { handle, specs }).await?)
    }

    async fn add_task(
        &self,
        handle: Handle,
        tasks: Vec<TaskSpecification>,
    ) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::AddTask { handle, tasks }).await?)
    }

    async fn end_job_specification(&self, handle: Handle) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::EndJobSpecification { handle }).await?)
    }

    async fn close_job(&self, handle: Handle) -> Result<(), PeerError> {
        expect_ok(self.call(PeerRequest::CloseJob { handle }).await?)
    }
}

/// Produces a peer for an advertised agent
pub trait PeerConnector: Send + Sync + 'static {
    fn connect(&self, agent: &AgentInfo) -> Arc<dyn AgentPeer>;
}

/// Peer reached over framed TCP, one connection per call
#[derive(Clone, Debug)]
pub struct TcpPeer {
    addr: String,
    token: Option<String>,
    timeout: Duration,
}

impl TcpPeer {
    pub fn new(addr: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), token, timeout }
    }

    /// Opening a connection waits on the callee's own callback, so it gets
    /// twice the base timeout. File transfers get at least a minute.
    fn timeout_for(&self, request: &PeerRequest) -> Duration {
        match request {
            PeerRequest::OpenRemoteConnection { .. } => self.timeout * 2,
            PeerRequest::SendChannel { .. } | PeerRequest::RequestChannel { .. } => {
                self.timeout.max(TRANSFER_TIMEOUT)
            }
            _ => self.timeout,
        }
    }

    async fn connect(&self, timeout: Duration) -> Result<TcpStream, PeerError> {
        match tokio::time::timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(PeerError::Unreachable { addr: self.addr.clone(), source }),
            Err(_) => Err(PeerError::Protocol(ProtocolError::Timeout)),
        }
    }
}

#[async_trait]
impl AgentPeer for TcpPeer {
    fn address(&self) -> String {
        self.addr.clone()
    }

    async fn call(&self, request: PeerRequest) -> Result<PeerResponse, PeerError> {
        let timeout = self.timeout_for(&request);
        let stream = self.connect(self.timeout).await?;
        let (mut reader, mut writer) = stream.into_split();
        let envelope =
            PeerEnvelope { version: PROTOCOL_VERSION, token: self.token.clone(), request };
        write_frame(&mut writer, &envelope, timeout).await?;
        match read_frame(&mut reader, timeout).await? {
            PeerResponse::Error { error } => Err(PeerError::Remote(error)),
            response => Ok(response),
        }
    }

    async fn ping_host(&self) -> bool {
        self.connect(self.timeout).await.is_ok()
    }
}

/// Builds [`TcpPeer`]s from advertised `ip:port`
#[derive(Clone, Debug)]
pub struct TcpConnector {
    token: Option<String>,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(token: Option<String>, timeout: Duration) -> Self {
        Self { token, timeout }
    }
}

impl PeerConnector for TcpConnector {
    fn connect(&self, agent: &AgentInfo) -> Arc<dyn AgentPeer> {
        Arc::new(TcpPeer::new(agent.address(), self.token.clone(), self.timeout))
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
