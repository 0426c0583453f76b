// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! swarmd: the per-machine swarm agent.
//!
//! Prints `READY` on stdout once the local socket accepts clients, then runs
//! until a client asks it to stop, a signal arrives, or the coordinator asks
//! for a restart.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use swarm_daemon::env;
use swarm_daemon::lifecycle::{self, run_maintenance, spawn_log_roller, MaintenanceExit};
use swarm_daemon::listener::{ListenCtx, Listener, PeerListener};
use swarm_daemon::{startup, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The launching CLI may have closed our stderr already.
            let _ = writeln!(std::io::stderr(), "swarmd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), LifecycleError> {
    let config = Config::load()?;
    let result = startup(&config).await?;
    let mut daemon = result.daemon;
    let agent = daemon.agent.clone();

    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        agent: agent.clone(),
        config: config.clone(),
        shutdown: Arc::clone(&shutdown),
    });
    tokio::spawn(Listener::new(result.listener, ctx).run());
    if let Some(tcp) = result.peers {
        tokio::spawn(PeerListener::new(tcp, agent.clone(), env::peer_token()).run());
    }
    agent.spawn_router();
    spawn_log_roller(&agent, daemon.log.clone());
    let mut maintenance = tokio::spawn(run_maintenance(agent.clone(), env::tick_interval()));

    let _ = writeln!(std::io::stdout(), "READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let agent_stopped = agent.shutdown_token();
    let exit = tokio::select! {
        _ = shutdown.notified() => {
            info!("shutdown requested by client");
            MaintenanceExit::Shutdown
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received");
            MaintenanceExit::Shutdown
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            MaintenanceExit::Shutdown
        }
        _ = agent_stopped.cancelled() => MaintenanceExit::Shutdown,
        exit = &mut maintenance => exit.unwrap_or_else(|e| {
            error!(error = %e, "maintenance task failed");
            MaintenanceExit::Shutdown
        }),
    };

    daemon.shutdown().await?;
    drop(daemon);

    if exit == MaintenanceExit::Restart {
        lifecycle::relaunch()?;
    }
    Ok(())
}
