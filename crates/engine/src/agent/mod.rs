// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent: explicit services wired together behind one cheap handle.
//!
//! [`Agent`] owns nothing itself. Each service holds only the collaborators
//! it needs, and the flows that span services (job replication, request
//! dispatch, shutdown) live in this module.

mod client;
mod distribution;
mod peer;

use crate::channels::{AgingLimits, ChannelService};
use crate::connection::ConnectionTable;
use crate::job::JobTable;
use crate::manager::ConnectionManager;
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::SharedConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use swarm_adapters::{Coordinator, PeerConnector, ProcessLauncher, TelemetrySink};
use swarm_core::{AgentConfig, AgentError, AgentResult, AgentState, Clock, Handle, JobGuid};
use swarm_core::{JobSpecifications, JobState, TaskSpecification};
use swarm_storage::ChannelCache;
use swarm_wire::{CacheMaintenance, CacheSummary, StatusSummary};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External collaborators, injected so tests can substitute fakes
#[derive(Clone)]
pub struct AgentDeps {
    pub coordinator: Arc<dyn Coordinator>,
    pub connector: Arc<dyn PeerConnector>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// What one maintenance tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub connections_removed: usize,
    pub jobs_removed: usize,
    pub cache_aged: bool,
}

#[derive(Clone)]
pub struct Agent {
    config: SharedConfig,
    connections: Arc<ConnectionTable>,
    jobs: Arc<JobTable>,
    router: Arc<Router>,
    channels: Arc<ChannelService>,
    scheduler: Arc<Scheduler>,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
}

impl Agent {
    /// Open the cache and wire the services. Nothing runs until
    /// [`Agent::spawn_router`].
    pub fn new(config: AgentConfig, deps: AgentDeps, clock: Arc<dyn Clock>) -> AgentResult<Self> {
        let cache = Arc::new(ChannelCache::open(&config.cache_root)?);
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let shutdown = CancellationToken::new();
        let connections = Arc::new(ConnectionTable::new());
        let jobs = Arc::new(JobTable::new());
        let router = Arc::new(Router::new(
            connections.clone(),
            jobs.clone(),
            clock.clone(),
            shutdown.clone(),
        ));
        let channels = Arc::new(ChannelService::new(cache, connections.clone()));
        let scheduler = Arc::new(Scheduler::new(
            connections.clone(),
            jobs.clone(),
            router.clone(),
            channels.clone(),
            deps.launcher.clone(),
            deps.telemetry.clone(),
            clock.clone(),
            config.clone(),
        ));
        let manager = Arc::new(ConnectionManager::new(
            connections.clone(),
            router.clone(),
            channels.clone(),
            scheduler.clone(),
            &deps,
            clock,
            config.clone(),
            shutdown.clone(),
        ));
        Ok(Self { config, connections, jobs, router, channels, scheduler, manager, shutdown })
    }

    /// Start the message router loop
    pub fn spawn_router(&self) -> JoinHandle<()> {
        tokio::spawn(self.router.clone().run())
    }

    pub fn config(&self) -> AgentConfig {
        self.config.read().clone()
    }

    pub fn name(&self) -> String {
        self.config.read().agent_name.clone()
    }

    pub fn connections(&self) -> &Arc<ConnectionTable> {
        &self.connections
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn channels(&self) -> &Arc<ChannelService> {
        &self.channels
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Cancelled once the agent has shut down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn status(&self) -> StatusSummary {
        let mut jobs: Vec<_> = self.jobs.all().iter().map(|j| j.entry()).collect();
        jobs.sort_by_key(|j| j.guid.to_string());
        StatusSummary {
            agent_name: self.name(),
            state: self.manager.state(),
            uptime_secs: self.manager.uptime().as_secs(),
            coordinator_responding: self.manager.coordinator_responding(),
            connections: self.manager.entries(),
            jobs,
            cache: self.channels.summary(),
        }
    }

    /// One maintenance tick: connections, then jobs, then the heartbeat
    /// and idle cache aging
    pub async fn tick(&self) -> TickReport {
        let connections_removed = self.manager.maintain_connections().await;
        let jobs_removed = self.scheduler.maintain_jobs();
        self.manager.ping_coordinator(false).await;

        let mut cache_aged = false;
        if self.manager.cache_cleanup_due() {
            match self.channels.maintain_cache(CacheMaintenance::Age, self.aging_limits()).await {
                Ok(Some(report)) if report.cancelled => {
                    tracing::info!("cache aging interrupted by a new connection");
                }
                Ok(_) => {
                    cache_aged = true;
                    self.manager.cache_cleanup_done();
                }
                Err(e) => tracing::debug!(error = %e, "cache aging skipped"),
            }
        }
        TickReport { connections_removed, jobs_removed, cache_aged }
    }

    fn aging_limits(&self) -> AgingLimits {
        let config = self.config.read();
        AgingLimits {
            quota_bytes: config.cache_quota_bytes,
            retained_job_folders: config.retained_job_folders,
        }
    }

    pub async fn maintain_cache(&self, mode: CacheMaintenance) -> AgentResult<CacheSummary> {
        if let Some(report) = self.channels.maintain_cache(mode, self.aging_limits()).await? {
            tracing::info!(
                channels = report.channels_removed,
                job_folders = report.job_folders_removed,
                cancelled = report.cancelled,
                "cache aged"
            );
        }
        Ok(self.channels.summary())
    }

    /// Swap in a new configuration. A changed cache root relocates the
    /// cache, which needs an idle agent.
    pub async fn reload_config(&self, config: AgentConfig) -> AgentResult<()> {
        let old_root = self.config.read().cache_root.clone();
        if config.cache_root != old_root {
            self.channels.relocate(config.cache_root.clone()).await?;
        }
        tracing::info!(agent = %config.agent_name, "configuration reloaded");
        *self.config.write() = config;
        Ok(())
    }

    /// Close every connection, then stop the router. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!("agent shutting down");
        self.manager.close_all().await;
        self.manager.set_state(AgentState::Closed);
        self.manager.ping_coordinator(true).await;
        self.shutdown.cancel();
    }

    /// Open a job for `handle`.
    ///
    /// A local instigator takes precedence over a remote one: any job we are
    /// working on for another agent is interrupted first.
    pub async fn open_job(&self, handle: Handle, guid: JobGuid) -> AgentResult<()> {
        let conn = self.connections.require(handle)?;
        if conn.is_local() && conn.parent().is_none() {
            let foreign: Vec<Handle> = self
                .jobs
                .all()
                .iter()
                .filter(|j| !j.owner_is_instigator && j.state() != JobState::Closed)
                .map(|j| j.owner)
                .collect();
            for owner in foreign {
                tracing::info!(job = %guid, remote = %owner, "interrupting remote work");
                if let Err(e) = self.manager.close(owner).await {
                    tracing::warn!(remote = %owner, error = %e, "interrupt failed");
                }
            }
        }
        self.scheduler.open_job(handle, guid).map(|_| ())
    }

    pub async fn begin_job_specification(
        &self,
        handle: Handle,
        specs: JobSpecifications,
    ) -> AgentResult<()> {
        self.scheduler.begin_job_specification(handle, specs).await
    }

    pub fn add_tasks(&self, handle: Handle, tasks: Vec<TaskSpecification>) -> AgentResult<()> {
        self.scheduler.add_tasks(handle, tasks)
    }

    pub async fn close_job(&self, handle: Handle) -> AgentResult<()> {
        let conn = self.connections.require(handle)?;
        self.manager.abandon_potential_agents(&conn);
        self.scheduler.close_job(handle).await
    }

    fn require_owner(&self, handle: Handle) -> AgentResult<()> {
        let conn = self.connections.require(handle)?;
        let job = self.scheduler.job_for(&conn)?;
        if job.owner != handle {
            return Err(AgentError::JobError(format!(
                "connection {handle} does not own job {}",
                job.guid
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../agent_tests.rs"]
mod tests;
