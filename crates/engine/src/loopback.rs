// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process peer network.
//!
//! Agents registered on a [`LoopbackNetwork`] reach each other by name, with
//! peer calls dispatched straight into the target's handler. Removing an
//! agent makes every peer pointing at it unreachable.

use crate::agent::Agent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use swarm_adapters::{AgentPeer, PeerConnector, PeerError};
use swarm_core::AgentInfo;
use swarm_wire::{PeerRequest, PeerResponse, ProtocolError};

#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent: &Agent) {
        self.agents.write().insert(agent.name(), agent.clone());
    }

    /// Take an agent off the network, as if its machine went away
    pub fn remove(&self, name: &str) {
        self.agents.write().remove(name);
    }

    pub fn connector(&self) -> Arc<dyn PeerConnector> {
        Arc::new(LoopbackConnector { network: self.clone() })
    }

    fn lookup(&self, name: &str) -> Option<Agent> {
        self.agents.read().get(name).cloned()
    }
}

struct LoopbackConnector {
    network: LoopbackNetwork,
}

impl PeerConnector for LoopbackConnector {
    fn connect(&self, agent: &AgentInfo) -> Arc<dyn AgentPeer> {
        Arc::new(LoopbackPeer { network: self.network.clone(), name: agent.name.clone() })
    }
}

pub struct LoopbackPeer {
    network: LoopbackNetwork,
    name: String,
}

#[async_trait]
impl AgentPeer for LoopbackPeer {
    fn address(&self) -> String {
        format!("loopback:{}", self.name)
    }

    async fn call(&self, request: PeerRequest) -> Result<PeerResponse, PeerError> {
        let Some(agent) = self.network.lookup(&self.name) else {
            return Err(PeerError::Protocol(ProtocolError::ConnectionClosed));
        };
        match agent.handle_peer_request(request).await {
            PeerResponse::Error { error } => Err(PeerError::Remote(error)),
            response => Ok(response),
        }
    }

    async fn ping_host(&self) -> bool {
        self.network.lookup(&self.name).is_some()
    }
}
