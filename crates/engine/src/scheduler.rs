// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job scheduler: opening, specifying, starting and closing jobs.
//!
//! Task bookkeeping lives on [`AgentJob`]; this service resolves the job a
//! connection refers to, stages its files, supervises its process and hands
//! whatever messages the job produces to the router.

use crate::channels::ChannelService;
use crate::connection::{Connection, ConnectionState, ConnectionTable};
use crate::job::{AgentJob, JobSettings, JobTable};
use crate::replay::{plan_replay, ReplayMismatch, ReplayPlan};
use crate::router::Router;
use crate::SharedConfig;
use std::path::PathBuf;
use std::sync::Arc;
use swarm_adapters::{LaunchSpec, ProcessLauncher, RunningProcess, TelemetrySink};
use swarm_core::{AgentError, AgentResult, Clock, Handle, JobFlags, JobGuid, JobSpecification};
use swarm_core::{JobSpecifications, JobState, Message, MessageBody, TaskSpecification, TaskState};

/// Environment variable telling the job executable how many cores it may use
pub const MAX_CORES_ENV: &str = "Swarm_MaxCores";

pub struct Scheduler {
    connections: Arc<ConnectionTable>,
    jobs: Arc<JobTable>,
    router: Arc<Router>,
    channels: Arc<ChannelService>,
    launcher: Arc<dyn ProcessLauncher>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    config: SharedConfig,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<ConnectionTable>,
        jobs: Arc<JobTable>,
        router: Arc<Router>,
        channels: Arc<ChannelService>,
        launcher: Arc<dyn ProcessLauncher>,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
        config: SharedConfig,
    ) -> Self {
        Self { connections, jobs, router, channels, launcher, telemetry, clock, config }
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    /// The job a connection is attached to
    pub fn job_for(&self, conn: &Connection) -> AgentResult<Arc<AgentJob>> {
        conn.job().and_then(|g| self.jobs.get(g)).ok_or(AgentError::JobNotFound)
    }

    /// The job `handle` owns
    fn owned_job(&self, handle: Handle) -> AgentResult<(Arc<Connection>, Arc<AgentJob>)> {
        let conn = self.connections.require(handle)?;
        let job = self.job_for(&conn)?;
        if job.owner != handle {
            return Err(AgentError::InvalidArgument(format!(
                "connection {handle} does not own job {}",
                job.guid
            )));
        }
        Ok((conn, job))
    }

    /// Create a job owned by `handle`, with a fresh scratch folder
    pub fn open_job(&self, handle: Handle, guid: JobGuid) -> AgentResult<Arc<AgentJob>> {
        let conn = self.connections.require(handle)?;
        if conn.state() != ConnectionState::Connected {
            return Err(AgentError::ConnectionDisconnected);
        }
        if let Some(existing) = conn.job().and_then(|g| self.jobs.get(g)) {
            if existing.state() != JobState::Closed {
                return Err(AgentError::JobError(format!(
                    "connection {handle} already has open job {}",
                    existing.guid
                )));
            }
        }
        if self.jobs.get(guid).is_some_and(|j| j.state() != JobState::Closed) {
            return Err(AgentError::JobError(format!("job {guid} is already open")));
        }

        self.channels.cache().create_job_dir(guid)?;
        let settings = {
            let config = self.config.read();
            JobSettings {
                machine: config.agent_name.clone(),
                local_cores: config.local_cores,
                remote_cores: config.remote_cores,
                avoid_local: config.avoid_local_execution,
            }
        };
        let job = Arc::new(AgentJob::new(
            guid,
            handle,
            conn.is_local(),
            settings,
            self.telemetry.clone(),
            self.clock.clone(),
        ));
        self.jobs.insert(job.clone());
        conn.lock().job = Some(guid);
        tracing::info!(job = %guid, owner = %handle, instigator = conn.is_local(), "job opened");
        Ok(job)
    }

    /// Resolve the executable and dependencies through the cache.
    ///
    /// Workers pull missing files from the instigator. A missing required
    /// file fails the call and leaves the job unspecified.
    pub async fn begin_job_specification(
        &self,
        handle: Handle,
        specs: JobSpecifications,
    ) -> AgentResult<()> {
        let (conn, job) = self.owned_job(handle)?;
        if job.state() != JobState::Unspecified {
            return Err(AgentError::JobError(format!("job {} is already specified", job.guid)));
        }
        let spec = specs.effective().cloned().ok_or_else(|| {
            AgentError::InvalidArgument("job specification has no variant".to_string())
        })?;

        for (name, required) in spec.all_channels() {
            match self.channels.ensure_channel(&conn, name).await {
                Ok(()) => {}
                Err(e) if required => {
                    tracing::error!(job = %job.guid, channel = name, error = %e, "missing file");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(job = %job.guid, channel = name, error = %e, "optional file");
                }
            }
        }
        job.set_specs(specs);
        tracing::info!(job = %job.guid, executable = %spec.executable, "job specified");
        Ok(())
    }

    /// Queue tasks on the job `handle` refers to.
    ///
    /// The owner may add tasks while the job is pending; a remote owner
    /// relaying the instigator's tasks may add them at any time.
    pub fn add_tasks(&self, handle: Handle, tasks: Vec<TaskSpecification>) -> AgentResult<()> {
        let conn = self.connections.require(handle)?;
        let job = self.job_for(&conn)?;
        let relayed = conn.is_remote() && job.owner == handle;
        let allowed = relayed || (job.owner == handle && job.state() == JobState::Pending);
        if !allowed {
            return Err(AgentError::JobError(format!(
                "job {} does not accept tasks from connection {handle} while {}",
                job.guid,
                job.state()
            )));
        }
        let count = tasks.len();
        for task in tasks {
            self.router.enqueue_all(job.add_task(&self.connections, task));
        }
        tracing::debug!(job = %job.guid, count, relayed, "tasks added");
        Ok(())
    }

    /// Stripe pending tasks across the wider of the local and remote pools
    pub fn order_pending(&self, job: &AgentJob) {
        let lanes = {
            let config = self.config.read();
            config.local_cores.max(config.remote_cores).max(1) as usize
        };
        job.order_pending(lanes);
    }

    /// Check the previous successful distribution against this job
    pub fn replay_plan(&self, job: &AgentJob) -> Result<ReplayPlan, ReplayMismatch> {
        let record = self.jobs.last_record().ok_or(ReplayMismatch::NoRecord)?;
        let spec = job.effective_spec().unwrap_or_default();
        plan_replay(&record, spec.original_name(&spec.executable), &job.pending_specs())
    }

    /// Copy files into the job folder, launch the executable and mark the
    /// job running
    pub fn start_job(&self, job: &Arc<AgentJob>) -> AgentResult<()> {
        let spec = job.effective_spec().ok_or_else(|| {
            AgentError::JobError(format!("job {} has no specification", job.guid))
        })?;
        if job.state() != JobState::Pending {
            return Err(AgentError::JobError(format!("job {} is {}", job.guid, job.state())));
        }
        let program = self.stage_files(job.guid, &spec)?;

        if spec.flags.contains(JobFlags::MANUAL_START) {
            tracing::info!(job = %job.guid, "manual start, waiting for the executable");
        } else {
            let process = self.launch(job, &spec, program)?;
            job.set_process(process.clone());
            self.watch_process(job.clone(), process);
        }
        self.router.enqueue_all(job.mark_running());
        self.router.enqueue_all(job.check_for_reservations(&self.connections));
        Ok(())
    }

    fn stage_files(&self, guid: JobGuid, spec: &JobSpecification) -> AgentResult<PathBuf> {
        let cache = self.channels.cache();
        let mut program = cache.job_dir(guid).join(spec.original_name(&spec.executable));
        for (name, required) in spec.all_channels() {
            match cache.copy_into_job(guid, name, spec.original_name(name)) {
                Ok(path) if name == spec.executable => program = path,
                Ok(_) => {}
                Err(e) if required => return Err(e.into()),
                Err(e) => tracing::debug!(job = %guid, channel = name, error = %e, "not staged"),
            }
        }
        Ok(program)
    }

    fn launch(
        &self,
        job: &AgentJob,
        spec: &JobSpecification,
        program: PathBuf,
    ) -> AgentResult<RunningProcess> {
        let (cores, max_log_lines) = {
            let config = self.config.read();
            let cores =
                if job.owner_is_instigator { config.local_cores } else { config.remote_cores };
            (cores, config.max_job_log_lines as u32)
        };
        let launch = LaunchSpec {
            program,
            arguments: spec.parameters.clone(),
            working_dir: self.channels.cache().job_dir(job.guid),
            env: vec![(MAX_CORES_ENV.to_string(), cores.to_string())],
            max_log_lines,
        };
        let process = self.launcher.launch(launch).map_err(|e| {
            tracing::error!(job = %job.guid, error = %e, "job executable failed to start");
            AgentError::JobError(e.to_string())
        })?;
        tracing::info!(job = %job.guid, pid = process.pid(), cores, "job executable started");
        Ok(process)
    }

    fn watch_process(&self, job: Arc<AgentJob>, process: RunningProcess) {
        let router = self.router.clone();
        tokio::spawn(async move {
            let code = process.wait().await;
            tracing::info!(job = %job.guid, pid = process.pid(), code, "job executable exited");
            router.enqueue_all(job.process_exited(code));
        });
    }

    /// Close the job `handle` owns.
    ///
    /// Pending messages are flushed first so late task states settle the
    /// job before the close-time check runs.
    pub async fn close_job(&self, handle: Handle) -> AgentResult<()> {
        let (conn, job) = self.owned_job(handle)?;
        self.finish_job(&conn, &job).await;
        Ok(())
    }

    /// Close `job` on behalf of its owner `conn`, forwarding the close to
    /// every remote worker
    pub async fn finish_job(&self, conn: &Arc<Connection>, job: &Arc<AgentJob>) {
        self.router.flush(conn.handle, false).await;
        let closed = job.close(&self.connections);
        self.router.enqueue_all(closed.messages);
        if let Some(record) = closed.record {
            tracing::debug!(job = %job.guid, workers = record.workers.len(), "recorded");
            self.jobs.set_last_record(Some(record));
        }

        let remote_children = conn.lock().remote_children.clone();
        for child in remote_children.iter().filter_map(|h| self.connections.get(*h)) {
            let sent = child.call_remote(|p, h| async move { p.close_job(h).await }).await;
            if let Err(e) = sent {
                tracing::warn!(job = %job.guid, worker = %child.handle, error = %e, "close");
            }
        }
    }

    /// Requeue the tasks a departing connection was running
    pub fn release_connection(&self, conn: &Connection) {
        let Some(job) = conn.job().and_then(|g| self.jobs.get(g)) else {
            return;
        };
        job.cancel_reservations(conn);
        let upstream: Vec<Message> = if job.owner_is_instigator {
            Vec::new()
        } else {
            // The instigator holds these tasks against our connection to it
            job.running_tasks()
                .iter()
                .filter(|t| t.owner == Some(conn.handle))
                .map(|t| {
                    let body = MessageBody::task_state(t.spec.guid, TaskState::Killed);
                    Message::routed(conn.handle, job.owner, body)
                })
                .collect()
        };
        self.router.enqueue_all(job.kill_tasks_owned_by(&self.connections, conn.handle));
        self.router.enqueue_all(upstream);
    }

    /// Periodic upkeep. Returns the number of jobs removed.
    pub fn maintain_jobs(&self) -> usize {
        let (avoid_local, timeout) = {
            let config = self.config.read();
            (config.avoid_local_execution, config.job_executable_timeout())
        };
        let now = self.clock.now();
        let mut removed = 0;
        for job in self.jobs.all() {
            if job.state() != JobState::Closed {
                if avoid_local && job.state() == JobState::Running {
                    self.router.enqueue_all(job.check_for_reservations(&self.connections));
                }
                continue;
            }
            if let Some(process) = job.process().filter(|p| !p.has_exited()) {
                let owner_gone = self
                    .connections
                    .get(job.owner)
                    .is_none_or(|o| o.state() == ConnectionState::Disconnected);
                let overdue = job
                    .stopped_at()
                    .is_some_and(|t| now.saturating_duration_since(t) >= timeout);
                if owner_gone || overdue {
                    tracing::warn!(job = %job.guid, pid = process.pid(), "killing job executable");
                    process.kill();
                }
                continue;
            }
            if self.jobs.remove(job.guid).is_some() {
                tracing::debug!(job = %job.guid, "closed job removed");
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
