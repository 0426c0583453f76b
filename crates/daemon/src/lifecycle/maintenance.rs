// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background upkeep: the maintenance tick and idle log rolling.

use std::time::Duration;

use swarm_engine::Agent;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::logging::RollingLog;

/// Why the maintenance loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceExit {
    /// The agent shut down
    Shutdown,
    /// The coordinator asked for a restart and the agent is idle
    Restart,
}

/// Tick the agent every `interval` until it shuts down or a restart is due
pub async fn run_maintenance(agent: Agent, interval: Duration) -> MaintenanceExit {
    let token = agent.shutdown_token();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => return MaintenanceExit::Shutdown,
            _ = ticker.tick() => {}
        }
        let report = agent.tick().await;
        if report.connections_removed > 0 || report.jobs_removed > 0 || report.cache_aged {
            debug!(
                connections = report.connections_removed,
                jobs = report.jobs_removed,
                cache_aged = report.cache_aged,
                "maintenance"
            );
        }
        if agent.manager().restart_due() {
            info!("restart requested by the coordinator");
            return MaintenanceExit::Restart;
        }
    }
}

/// Start a new log file each time the agent goes idle
pub fn spawn_log_roller(agent: &Agent, log: RollingLog) {
    let mut idle = agent.manager().subscribe_idle();
    let token = agent.shutdown_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = idle.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    match log.roll() {
                        Ok(path) => info!(path = %path.display(), "log rolled"),
                        Err(e) => warn!(error = %e, "failed to roll log"),
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
