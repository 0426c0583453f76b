// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Starting a job and spreading it across remote workers.
//!
//! An instigator either replays the previous distribution (reconnecting
//! the same workers and pushing each its recorded tasks) or recruits
//! whichever agents the coordinator lists while tasks are still pending.

use super::Agent;
use crate::connection::{Connection, ConnectionState};
use crate::job::AgentJob;
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{AgentError, AgentResult, Handle, JobFlags, JobState};

/// Passes over agents that declined before recruitment gives up
pub const RECRUIT_RETRY_PASSES: u32 = 3;

/// Pause before asking declined agents again
pub const RECRUIT_BACKOFF: Duration = Duration::from_secs(5);

impl Agent {
    /// Finish the specification and start the job.
    ///
    /// Only the owner may end the specification. On an instigator this also
    /// sets up remote help; replay falls back to a normal start when the
    /// previous distribution no longer fits.
    pub async fn end_job_specification(&self, handle: Handle) -> AgentResult<()> {
        self.require_owner(handle)?;
        let conn = self.connections.require(handle)?;
        let job = self.scheduler.job_for(&conn)?;
        if job.state() != JobState::Pending {
            return Err(AgentError::JobError(format!("job {} is {}", job.guid, job.state())));
        }
        self.scheduler.order_pending(&job);

        let distributes = self.distributes(&job);
        let replay = self.config.read().replay_last_distribution;
        let workers = if distributes && replay {
            self.prepare_replay(&conn, &job).await
        } else {
            None
        };

        if let Err(e) = self.scheduler.start_job(&job) {
            for worker in workers.unwrap_or_default() {
                self.close_worker(worker.handle).await;
            }
            return Err(e);
        }

        match workers {
            Some(workers) => {
                for worker in workers {
                    if let Err(e) = self.replicate_job(&worker, &job).await {
                        let handle = worker.handle;
                        tracing::warn!(job = %job.guid, worker = %handle, error = %e, "replay");
                        self.close_worker(handle).await;
                    }
                }
            }
            None if distributes => self.spawn_recruitment(conn, job),
            None => {}
        }
        Ok(())
    }

    /// Reconnect every worker of the recorded distribution. `None` when the
    /// record does not fit or any worker cannot be reached.
    async fn prepare_replay(
        &self,
        owner: &Arc<Connection>,
        job: &Arc<AgentJob>,
    ) -> Option<Vec<Arc<Connection>>> {
        let plan = match self.scheduler.replay_plan(job) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::info!(job = %job.guid, reason = %e, "normal distribution");
                return None;
            }
        };
        let record = self.jobs.last_record()?;
        let own_name = self.name();

        let mut workers = Vec::new();
        for agent in record.remote_workers(&own_name) {
            match self.manager.try_open_remote(owner, agent.clone()).await {
                Ok(Some(worker)) => workers.push(worker),
                Ok(None) | Err(_) => {
                    tracing::info!(job = %job.guid, agent = %agent.name, "replay worker missing");
                    for worker in workers {
                        self.close_worker(worker.handle).await;
                    }
                    return None;
                }
            }
        }
        tracing::info!(job = %job.guid, workers = workers.len(), "replaying distribution");
        job.set_replay(plan);
        Some(workers)
    }

    /// Open the job on a connected worker and hand over its specification.
    /// In replay mode its recorded tasks are pushed straight away.
    async fn replicate_job(
        &self,
        worker: &Arc<Connection>,
        job: &Arc<AgentJob>,
    ) -> AgentResult<()> {
        let guid = job.guid;
        let specs = job
            .specs()
            .ok_or_else(|| AgentError::JobError(format!("job {guid} has no specification")))?;
        worker.call_remote(|p, h| async move { p.open_job(h, guid).await }).await?;
        worker
            .call_remote(|p, h| async move { p.begin_job_specification(h, specs).await })
            .await?;
        worker.call_remote(|p, h| async move { p.end_job_specification(h).await }).await?;

        if job.is_deterministic() {
            let tasks = job.take_replay_tasks(&self.connections, worker);
            if !tasks.is_empty() {
                let count = tasks.len();
                worker.call_remote(|p, h| async move { p.add_task(h, tasks).await }).await?;
                tracing::debug!(job = %guid, worker = %worker.handle, count, "replayed tasks");
            }
        }
        tracing::info!(job = %guid, worker = %worker.peer_label(), "job replicated");
        Ok(())
    }

    /// Instigator jobs that allow remote help and launch their own
    /// executable, on an agent that is not standalone
    fn distributes(&self, job: &AgentJob) -> bool {
        let flags = job.flags();
        job.owner_is_instigator
            && !self.config.read().standalone
            && flags.contains(JobFlags::ALLOW_REMOTE)
            && !flags.contains(JobFlags::MANUAL_START)
    }

    async fn close_worker(&self, handle: Handle) {
        if let Err(e) = self.manager.close(handle).await {
            tracing::debug!(%handle, error = %e, "worker already gone");
        }
    }

    fn spawn_recruitment(&self, owner: Arc<Connection>, job: Arc<AgentJob>) {
        let agent = self.clone();
        tokio::spawn(async move { agent.recruit_workers(owner, job).await });
    }

    /// Ask candidate agents for help while the job still has work queued
    pub(crate) async fn recruit_workers(&self, owner: Arc<Connection>, job: Arc<AgentJob>) {
        let candidates = self.manager.reset_potential_agents(&owner).await;
        tracing::debug!(job = %job.guid, candidates, "recruiting remote workers");
        let mut passes = 0;
        while self.wants_help(&owner, &job) {
            let Some(agent) = self.manager.next_remote_agent(&owner) else {
                passes += 1;
                if passes > RECRUIT_RETRY_PASSES || self.manager.retry_unavailable(&owner) == 0 {
                    break;
                }
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECRUIT_BACKOFF) => {}
                }
                continue;
            };
            match self.manager.try_open_remote(&owner, agent.clone()).await {
                Ok(Some(worker)) => {
                    if let Err(e) = self.replicate_job(&worker, &job).await {
                        let name = &agent.name;
                        tracing::warn!(job = %job.guid, agent = %name, error = %e, "replicate");
                        self.close_worker(worker.handle).await;
                    }
                }
                Ok(None) => self.manager.park_unavailable(&owner, agent),
                Err(e) => {
                    tracing::debug!(agent = %agent.name, error = %e, "remote open failed");
                    self.manager.park_unavailable(&owner, agent);
                }
            }
        }
        self.manager.abandon_potential_agents(&owner);
        tracing::debug!(job = %job.guid, "recruitment finished");
    }

    fn wants_help(&self, owner: &Connection, job: &AgentJob) -> bool {
        if self.shutdown.is_cancelled()
            || owner.state() != ConnectionState::Connected
            || job.state() != JobState::Running
        {
            return false;
        }
        // Each recruited worker counts for as many lanes as run locally
        let (lanes, local) = {
            let config = self.config.read();
            (config.local_cores.max(1) as usize, !config.avoid_local_execution)
        };
        let workers = owner.lock().remote_children.len();
        let capacity = lanes * (workers + usize::from(local));
        job.pending_len() > capacity
    }
}
