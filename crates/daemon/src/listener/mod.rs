// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener tasks for socket I/O.
//!
//! The [`Listener`] accepts local clients on the Unix socket. Each
//! connection carries one request and one response; the handler is raced
//! against client disconnect so abandoned requests stop early. Peer agents
//! are served separately by [`PeerListener`] on the TCP peer port.

mod peers;

pub use peers::PeerListener;

use std::sync::Arc;

use swarm_engine::Agent;
use swarm_wire::{read_request, write_response, ProtocolError, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::env::ipc_timeout;
use crate::lifecycle::{self, Config, LifecycleError};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub agent: Agent,
    pub config: Config,
    /// Signalled when a client asks the daemon to stop
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting local client connections.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run the accept loop until the agent shuts down.
    pub async fn run(self) {
        let token = self.ctx.agent.shutdown_token();
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.unix.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("Unix accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected")
        }
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("Connection timeout"),
        _ => error!("Connection error: {}", e),
    }
}

/// Handle a single client connection.
///
/// A client that closes its end before the response is ready (for example
/// after its own timeout) drops the handler instead of leaving it running.
async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let request = read_request(&mut reader, ipc_timeout()).await?;

    if request.is_polling() {
        debug!(request = ?request, "received request");
    } else {
        info!(request = ?request, "received request");
    }

    let response = tokio::select! {
        response = handle_request(request, ctx) => response,
        _ = detect_client_disconnect(&mut reader) => {
            debug!("Client disconnected, cancelling handler");
            return Ok(());
        }
    };

    write_response(&mut writer, &response, ipc_timeout()).await?;
    Ok(())
}

/// Resolves once the client closes its end (or sends unexpected bytes).
async fn detect_client_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

/// Requests the daemon owns itself; everything else goes to the agent.
async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::ReloadConfig => match lifecycle::reload_config(&ctx.config, &ctx.agent).await {
            Ok(()) => Response::Ok,
            Err(LifecycleError::Agent(e)) => Response::error(e),
            Err(e) => Response::error(swarm_core::AgentError::InvalidArgument(e.to_string())),
        },

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }

        request => ctx.agent.handle_request(request).await,
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
