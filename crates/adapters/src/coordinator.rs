// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator directory adapter.
//!
//! The coordinator hands out unique connection handles, lists agents that can
//! take work, and receives a periodic heartbeat from every agent.

use async_trait::async_trait;
use std::time::Duration;
use swarm_core::AgentInfo;
use swarm_wire::{read_frame, write_frame, CoordinatorRequest, CoordinatorResponse, ProtocolError};
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no coordinator configured")]
    NotConfigured,

    #[error("coordinator unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("coordinator protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("coordinator refused: {0}")]
    Refused(String),

    #[error("unexpected coordinator response: {0}")]
    Unexpected(String),
}

/// Adapter for the coordinator directory
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// A handle no other live connection in the swarm uses
    async fn get_unique_handle(&self) -> Result<i32, CoordinatorError>;

    /// Agents advertising `group`, or every agent when `group` is `None`
    async fn get_available_agents(
        &self,
        group: Option<&str>,
    ) -> Result<Vec<AgentInfo>, CoordinatorError>;

    /// Heartbeat. Returns `true` when the coordinator asks for a restart.
    async fn ping(&self, info: &AgentInfo) -> Result<bool, CoordinatorError>;

    async fn restart_agent_group(&self, group: &str) -> Result<(), CoordinatorError>;
}

/// Used when no coordinator address is configured; every call fails
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCoordinator;

#[async_trait]
impl Coordinator for NoCoordinator {
    async fn get_unique_handle(&self) -> Result<i32, CoordinatorError> {
        Err(CoordinatorError::NotConfigured)
    }

    async fn get_available_agents(
        &self,
        _group: Option<&str>,
    ) -> Result<Vec<AgentInfo>, CoordinatorError> {
        Err(CoordinatorError::NotConfigured)
    }

    async fn ping(&self, _info: &AgentInfo) -> Result<bool, CoordinatorError> {
        Err(CoordinatorError::NotConfigured)
    }

    async fn restart_agent_group(&self, _group: &str) -> Result<(), CoordinatorError> {
        Err(CoordinatorError::NotConfigured)
    }
}

/// Coordinator reached over framed TCP, one connection per call
#[derive(Clone, Debug)]
pub struct TcpCoordinator {
    addr: String,
    timeout: Duration,
}

impl TcpCoordinator {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(
        &self,
        request: CoordinatorRequest,
    ) -> Result<CoordinatorResponse, CoordinatorError> {
        let connect = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr));
        let stream = match connect.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(CoordinatorError::Unreachable { addr: self.addr.clone(), source })
            }
            Err(_) => return Err(CoordinatorError::Protocol(ProtocolError::Timeout)),
        };
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &request, self.timeout).await?;
        match read_frame(&mut reader, self.timeout).await? {
            CoordinatorResponse::Error { message } => Err(CoordinatorError::Refused(message)),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl Coordinator for TcpCoordinator {
    async fn get_unique_handle(&self) -> Result<i32, CoordinatorError> {
        match self.call(CoordinatorRequest::GetUniqueHandle).await? {
            CoordinatorResponse::Handle { handle } => Ok(handle),
            other => Err(CoordinatorError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn get_available_agents(
        &self,
        group: Option<&str>,
    ) -> Result<Vec<AgentInfo>, CoordinatorError> {
        let request = CoordinatorRequest::GetAvailableAgents { group: group.map(String::from) };
        match self.call(request).await? {
            CoordinatorResponse::Agents { agents } => Ok(agents),
            other => Err(CoordinatorError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn ping(&self, info: &AgentInfo) -> Result<bool, CoordinatorError> {
        match self.call(CoordinatorRequest::Ping { info: info.clone() }).await? {
            CoordinatorResponse::Pong { restart } => Ok(restart),
            other => Err(CoordinatorError::Unexpected(format!("{other:?}"))),
        }
    }

    async fn restart_agent_group(&self, group: &str) -> Result<(), CoordinatorError> {
        match self.call(CoordinatorRequest::RestartAgentGroup { group: group.to_string() }).await? {
            CoordinatorResponse::Ok => Ok(()),
            other => Err(CoordinatorError::Unexpected(format!("{other:?}"))),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{Coordinator, CoordinatorError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use swarm_core::AgentInfo;

    struct FakeCoordinatorState {
        next_handle: i32,
        agents: Vec<AgentInfo>,
        pings: Vec<AgentInfo>,
        restart_requested: bool,
        restarted_groups: Vec<String>,
        offline: bool,
    }

    /// In-memory coordinator for tests
    #[derive(Clone)]
    pub struct FakeCoordinator {
        inner: Arc<Mutex<FakeCoordinatorState>>,
    }

    impl Default for FakeCoordinator {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeCoordinatorState {
                    next_handle: 1000,
                    agents: Vec::new(),
                    pings: Vec::new(),
                    restart_requested: false,
                    restarted_groups: Vec::new(),
                    offline: false,
                })),
            }
        }
    }

    impl FakeCoordinator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an agent returned by `get_available_agents`
        pub fn add_agent(&self, info: AgentInfo) {
            self.inner.lock().agents.push(info);
        }

        /// Make every call fail as if the coordinator were down
        pub fn set_offline(&self, offline: bool) {
            self.inner.lock().offline = offline;
        }

        /// Answer the next heartbeats with a restart request
        pub fn request_restart(&self, restart: bool) {
            self.inner.lock().restart_requested = restart;
        }

        pub fn pings(&self) -> Vec<AgentInfo> {
            self.inner.lock().pings.clone()
        }

        pub fn restarted_groups(&self) -> Vec<String> {
            self.inner.lock().restarted_groups.clone()
        }

        fn check_online(&self) -> Result<(), CoordinatorError> {
            if self.inner.lock().offline {
                return Err(CoordinatorError::Refused("offline".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Coordinator for FakeCoordinator {
        async fn get_unique_handle(&self) -> Result<i32, CoordinatorError> {
            self.check_online()?;
            let mut state = self.inner.lock();
            let handle = state.next_handle;
            state.next_handle += 1;
            Ok(handle)
        }

        async fn get_available_agents(
            &self,
            group: Option<&str>,
        ) -> Result<Vec<AgentInfo>, CoordinatorError> {
            self.check_online()?;
            let state = self.inner.lock();
            Ok(state
                .agents
                .iter()
                .filter(|a| group.is_none_or(|g| a.group.eq_ignore_ascii_case(g)))
                .cloned()
                .collect())
        }

        async fn ping(&self, info: &AgentInfo) -> Result<bool, CoordinatorError> {
            self.check_online()?;
            let mut state = self.inner.lock();
            state.pings.push(info.clone());
            Ok(state.restart_requested)
        }

        async fn restart_agent_group(&self, group: &str) -> Result<(), CoordinatorError> {
            self.check_online()?;
            self.inner.lock().restarted_groups.push(group.to_string());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCoordinator;

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
