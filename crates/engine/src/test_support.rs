// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles shared by the engine's unit tests.

use crate::agent::{Agent, AgentDeps};
use crate::loopback::LoopbackNetwork;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use swarm_adapters::{AgentPeer, FakeCoordinator, FakeLauncher, PeerError, RecordingTelemetry};
use swarm_core::{AgentConfig, AgentError, AgentInfo, AgentResult, FakeClock};
use swarm_wire::{PeerRequest, PeerResponse, ProtocolError};

/// How a [`RecordingPeer`] answers calls
#[derive(Debug, Clone)]
pub enum PeerBehaviour {
    /// `Ok`, `Flag { true }` or `Opened` as the request expects
    Accept,
    /// The peer answered with an error of its own
    Refuse(AgentError),
    /// The transport failed
    Unreachable,
    /// Never answer
    Hang,
}

/// Peer that records every request and answers per its behaviour
pub struct RecordingPeer {
    calls: Mutex<Vec<PeerRequest>>,
    behaviour: Mutex<PeerBehaviour>,
}

impl Default for RecordingPeer {
    fn default() -> Self {
        Self { calls: Mutex::new(Vec::new()), behaviour: Mutex::new(PeerBehaviour::Accept) }
    }
}

impl RecordingPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(behaviour: PeerBehaviour) -> Arc<Self> {
        let peer = Self::new();
        peer.set_behaviour(behaviour);
        peer
    }

    pub fn set_behaviour(&self, behaviour: PeerBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    pub fn calls(&self) -> Vec<PeerRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AgentPeer for RecordingPeer {
    fn address(&self) -> String {
        "recording:0".to_string()
    }

    async fn call(&self, request: PeerRequest) -> Result<PeerResponse, PeerError> {
        let reply = match &request {
            PeerRequest::OpenRemoteConnection { .. } => {
                PeerResponse::Opened { handle: Some(swarm_core::Handle(900)) }
            }
            PeerRequest::ConfirmRemoteConnection { .. }
            | PeerRequest::TestConnection { .. }
            | PeerRequest::ValidateChannel { .. } => PeerResponse::Flag { value: true },
            _ => PeerResponse::Ok,
        };
        self.calls.lock().push(request);
        let behaviour = self.behaviour.lock().clone();
        match behaviour {
            PeerBehaviour::Accept => Ok(reply),
            PeerBehaviour::Refuse(e) => Err(PeerError::Remote(e)),
            PeerBehaviour::Unreachable => Err(PeerError::Protocol(ProtocolError::ConnectionClosed)),
            PeerBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn ping_host(&self) -> bool {
        !matches!(*self.behaviour.lock(), PeerBehaviour::Unreachable)
    }
}

pub fn agent_info(name: &str) -> AgentInfo {
    AgentInfo { name: name.to_string(), ip: "127.0.0.1".to_string(), ..Default::default() }
}

/// One core each way and a short remote timeout
pub fn agent_config(name: &str, cache_root: &Path) -> AgentConfig {
    AgentConfig::default()
        .agent_name(name)
        .cache_root(cache_root)
        .local_cores(1)
        .remote_cores(1)
        .remote_timeout_secs(1)
        .job_executable_timeout_secs(5)
}

/// An agent wired to fakes and reachable on a loopback network
pub struct TestAgent {
    pub agent: Agent,
    pub launcher: FakeLauncher,
    pub telemetry: Arc<RecordingTelemetry>,
    pub clock: FakeClock,
}

impl TestAgent {
    /// Build the agent, start its router, put it on `network` and list it
    /// with `coordinator`
    pub fn start(
        config: AgentConfig,
        coordinator: &FakeCoordinator,
        network: &LoopbackNetwork,
    ) -> AgentResult<Self> {
        let launcher = FakeLauncher::new();
        let telemetry = Arc::new(RecordingTelemetry::new());
        let clock = FakeClock::new();
        let deps = AgentDeps {
            coordinator: Arc::new(coordinator.clone()),
            connector: network.connector(),
            launcher: Arc::new(launcher.clone()),
            telemetry: telemetry.clone(),
        };
        let agent = Agent::new(config, deps, Arc::new(clock.clone()))?;
        agent.spawn_router();
        network.register(&agent);
        coordinator.add_agent(agent.manager().agent_info());
        Ok(Self { agent, launcher, telemetry, clock })
    }
}
