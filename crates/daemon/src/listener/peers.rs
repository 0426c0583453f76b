// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer port: typed agent-to-agent calls, one envelope per TCP connection.

use std::time::Duration;

use swarm_core::AgentError;
use swarm_engine::Agent;
use swarm_wire::{read_frame, write_frame, PeerEnvelope, PeerResponse, PROTOCOL_VERSION};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use super::{log_connection_error, ConnectionError};

pub struct PeerListener {
    tcp: TcpListener,
    agent: Agent,
    /// Shared secret peers must present, when configured
    token: Option<String>,
}

impl PeerListener {
    pub fn new(tcp: TcpListener, agent: Agent, token: Option<String>) -> Self {
        Self { tcp, agent, token }
    }

    pub async fn run(self) {
        let shutdown = self.agent.shutdown_token();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.tcp.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    debug!("peer connection from {}", addr);
                    let agent = self.agent.clone();
                    let token = self.token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, &agent, token.as_deref()).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("TCP accept error: {}", e),
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    agent: &Agent,
    token: Option<&str>,
) -> Result<(), ConnectionError> {
    let timeout = agent.config().remote_timeout();
    let (mut reader, mut writer) = stream.into_split();
    let envelope: PeerEnvelope = read_frame(&mut reader, timeout).await?;

    let response = match admit(&envelope, token) {
        Ok(()) => {
            debug!(request = ?envelope.request, "peer request");
            agent.handle_peer_request(envelope.request).await
        }
        Err(error) => {
            warn!(version = envelope.version, %error, "peer call refused");
            PeerResponse::Error { error }
        }
    };

    // Channel transfers can be large; give the reply the same floor the caller uses.
    write_frame(&mut writer, &response, timeout.max(Duration::from_secs(60))).await?;
    Ok(())
}

/// Version must match; the token must match when one is configured
pub(super) fn admit(envelope: &PeerEnvelope, token: Option<&str>) -> Result<(), AgentError> {
    if envelope.version != PROTOCOL_VERSION {
        return Err(AgentError::InvalidArgument(format!(
            "protocol version {} not supported (expected {})",
            envelope.version, PROTOCOL_VERSION
        )));
    }
    match token {
        Some(expected) if envelope.token.as_deref() != Some(expected) => {
            Err(AgentError::InvalidArgument("unauthorized".to_string()))
        }
        _ => Ok(()),
    }
}
