// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, maintenance, shutdown.

mod maintenance;
mod startup;
pub use maintenance::{run_maintenance, spawn_log_roller, MaintenanceExit};
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use swarm_core::{AgentConfig, AgentError, ConfigError};
use swarm_engine::Agent;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::logging::RollingLog;

/// Daemon file locations
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/swarm)
    pub state_dir: PathBuf,
    /// Path to Unix socket for local clients
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    /// Agent configuration file, optional
    pub config_path: PathBuf,
}

impl Config {
    /// Paths for the user-level daemon.
    ///
    /// Uses fixed paths under `~/.local/state/swarm/` (or
    /// `$XDG_STATE_HOME/swarm/`, or `$SWARM_STATE_DIR`).
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::in_dir(crate::env::state_dir()?))
    }

    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            socket_path: state_dir.join("agent.sock"),
            lock_path: state_dir.join("agent.pid"),
            version_path: state_dir.join("agent.version"),
            config_path: state_dir.join("agent.toml"),
            state_dir,
        }
    }

    /// Defaults, then `agent.toml` when present, then `SWARM_*` overrides.
    /// A relative cache root is taken relative to the state directory.
    pub fn load_agent_config(&self) -> Result<AgentConfig, LifecycleError> {
        let config = if self.config_path.exists() {
            AgentConfig::load(&self.config_path)?
        } else {
            AgentConfig::default()
        };
        let mut config = crate::env::apply_overrides(config);
        if config.cache_root.is_relative() {
            config.cache_root = self.state_dir.join(&config.cache_root);
        }
        Ok(config)
    }
}

/// Daemon state during operation.
///
/// The listeners are returned separately from startup to be spawned as tasks.
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub agent: Agent,
    pub log: RollingLog,
    // NOTE(lifetime): Flushes buffered log lines on drop
    #[allow(dead_code)]
    log_guard: WorkerGuard,
    /// When daemon started
    pub start_time: Instant,
}

/// Result of daemon startup: the daemon state and its listeners.
pub struct StartupResult {
    pub daemon: DaemonState,
    /// Local client socket
    pub listener: UnixListener,
    /// Peer port; absent in standalone mode
    pub peers: Option<TcpListener>,
}

impl DaemonState {
    /// Shutdown the daemon gracefully.
    ///
    /// Closes every connection through the agent (remote workers are told
    /// their instigator went away), then removes the socket, PID and
    /// version files. The lock is released when the state is dropped.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");
        self.agent.shutdown().await;

        for path in [&self.config.socket_path, &self.config.lock_path, &self.config.version_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove daemon file");
                }
            }
        }

        info!(uptime_secs = self.start_time.elapsed().as_secs(), "Daemon shutdown complete");
        Ok(())
    }
}

/// Re-read the agent configuration and hand it to the running agent
pub async fn reload_config(config: &Config, agent: &Agent) -> Result<(), LifecycleError> {
    let fresh = config.load_agent_config()?;
    std::fs::create_dir_all(&fresh.cache_root)
        .map_err(|e| LifecycleError::CacheRoot(fresh.cache_root.clone(), e))?;
    agent.reload_config(fresh).await?;
    Ok(())
}

/// Start a new copy of this daemon, as the coordinator asked for a restart
pub fn relaunch() -> Result<(), LifecycleError> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(&exe).args(std::env::args_os().skip(1)).spawn()?;
    info!(exe = %exe.display(), "relaunched");
    Ok(())
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("Cache root {0} is unusable: {1}")]
    CacheRoot(PathBuf, std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
