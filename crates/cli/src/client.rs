// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the local agent socket.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use swarm_core::AgentError;
use swarm_daemon::{Config, LifecycleError};
use swarm_wire::{read_frame, write_frame, CacheMaintenance, CacheSummary, ProtocolError};
use swarm_wire::{Request, Response, StatusSummary, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Agent not running")]
    NotRunning,

    #[error("{0}")]
    Paths(#[from] LifecycleError),

    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Agent(AgentError),

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl ClientError {
    pub fn is_not_running(&self) -> bool {
        match self {
            ClientError::NotRunning => true,
            ClientError::Protocol(ProtocolError::ConnectionClosed) => true,
            ClientError::Io(e) => {
                matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused)
            }
            _ => false,
        }
    }
}

/// One request per connection to the agent's Unix socket
#[derive(Debug, Clone)]
pub struct AgentClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl AgentClient {
    /// Client for the user-level agent. Fails fast when no socket exists.
    pub fn connect() -> Result<Self, ClientError> {
        let config = Config::load()?;
        if !config.socket_path.exists() {
            return Err(ClientError::NotRunning);
        }
        Ok(Self::at(config.socket_path, swarm_daemon::env::ipc_timeout()))
    }

    pub fn at(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { socket_path: socket_path.into(), timeout }
    }

    /// Send one request. Agent errors come back as [`ClientError::Agent`].
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => stream,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
                return Err(ClientError::NotRunning)
            }
            Err(e) => return Err(e.into()),
        };
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, request, self.timeout).await?;
        match read_frame(&mut reader, self.timeout).await? {
            Response::Error { error, .. } => Err(ClientError::Agent(error)),
            response => Ok(response),
        }
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        Err(ClientError::Unexpected(format!("{response:?}")))
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Protocol version the agent speaks
    pub async fn hello(&self) -> Result<u32, ClientError> {
        match self.send(&Request::Hello { version: PROTOCOL_VERSION }).await? {
            Response::Hello { version } => Ok(version),
            other => Self::reject(other),
        }
    }

    pub async fn status(&self) -> Result<StatusSummary, ClientError> {
        match self.send(&Request::Status).await? {
            Response::Status { status } => Ok(status),
            other => Self::reject(other),
        }
    }

    pub async fn maintain_cache(
        &self,
        mode: CacheMaintenance,
    ) -> Result<CacheSummary, ClientError> {
        match self.send(&Request::MaintainCache { mode }).await? {
            Response::Cache { summary } => Ok(summary),
            other => Self::reject(other),
        }
    }

    pub async fn reload_config(&self) -> Result<(), ClientError> {
        match self.send(&Request::ReloadConfig).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// Ask the agent to stop. `false` when it was not running.
    pub async fn shutdown(&self) -> Result<bool, ClientError> {
        match self.send(&Request::Shutdown).await {
            Ok(Response::ShuttingDown) => Ok(true),
            Ok(other) => Self::reject(other),
            Err(e) if e.is_not_running() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
