// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use swarm_adapters::{Coordinator, NoCoordinator, TcpConnector, TcpCoordinator};
use swarm_adapters::{TelemetrySink, TokioLauncher, TracingTelemetry};
use swarm_core::{AgentConfig, SystemClock};
use swarm_engine::{Agent, AgentDeps};
use swarm_storage::CacheLayout;
use tokio::net::{TcpListener, UnixListener};
use tracing::info;

use crate::logging::{self, RollingLog};

use super::{Config, DaemonState, LifecycleError, StartupResult};

/// Start the daemon
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock:
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // 3. Configuration and cache root. An unusable cache is fatal.
    let mut agent_config = config.load_agent_config()?;
    std::fs::create_dir_all(&agent_config.cache_root)
        .map_err(|e| LifecycleError::CacheRoot(agent_config.cache_root.clone(), e))?;

    // 4. Logging into the cache's Logs folder
    let log = RollingLog::open(&CacheLayout::new(&agent_config.cache_root).logs_dir())?;
    let log_guard = logging::init(&log);

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // 5. Peer port. Binding first lets port 0 pick a free port to advertise.
    let peers = if agent_config.standalone {
        None
    } else {
        let addr = format!("0.0.0.0:{}", agent_config.peer_port);
        let tcp = TcpListener::bind(&addr)
            .await
            .map_err(|e| LifecycleError::BindFailed(addr.clone(), e))?;
        agent_config.peer_port = tcp.local_addr()?.port();
        Some(tcp)
    };

    // 6. Agent services
    info!(
        agent = %agent_config.agent_name,
        cache = %agent_config.cache_root.display(),
        standalone = agent_config.standalone,
        "starting agent"
    );
    let deps = build_deps(&agent_config);
    let agent = Agent::new(agent_config, deps, Arc::new(SystemClock))?;

    // 7. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.display().to_string(), e))?;

    info!("Daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            agent,
            log,
            log_guard,
            start_time: Instant::now(),
        },
        listener,
        peers,
    })
}

/// Real collaborators for a configured agent
fn build_deps(config: &AgentConfig) -> AgentDeps {
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetry::default());
    let timeout = config.remote_timeout();
    let coordinator: Arc<dyn Coordinator> = match &config.coordinator {
        Some(addr) if !config.standalone => Arc::new(TcpCoordinator::new(addr.clone(), timeout)),
        _ => Arc::new(NoCoordinator),
    };
    AgentDeps {
        coordinator,
        connector: Arc::new(TcpConnector::new(crate::env::peer_token(), timeout)),
        launcher: Arc::new(TokioLauncher::new(telemetry.clone())),
        telemetry,
    }
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    // Remove socket if we created it
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }

    // Remove version file
    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }

    // Remove PID/lock file
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
