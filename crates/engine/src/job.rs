// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs and their tasks.
//!
//! Every method that changes a job takes the job's lock for the whole
//! change, so a task is always in exactly one of pending, running or
//! retired. Methods never await; messages they want delivered are returned
//! for the caller to hand to the router.

use crate::connection::{Connection, ConnectionTable};
use crate::replay::{build_record, AgentJobRecord, Assignment, RecordedTask, ReplayPlan};
use crate::striping::distribution_order;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use swarm_adapters::{LogColour, MachineState, RunningProcess, TelemetrySink, Verbosity};
use swarm_core::{AgentInfo, Clock, Handle, JobFlags, JobGuid, JobReport, JobSpecification};
use swarm_core::{JobSpecifications, JobState, Message, MessageBody, RwMap, RwQueue, RwStack};
use swarm_core::{SuccessState, TaskGuid, TaskResponse, TaskSpecification, TaskState};
use swarm_wire::JobEntry;

/// Agent settings a job needs, fixed when the job opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// This agent's name
    pub machine: String,
    pub local_cores: u32,
    pub remote_cores: u32,
    pub avoid_local: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub task_count: u32,
    pub task_count_remote: u32,
    pub task_count_requeue: u32,
    pub task_success_count: u32,
    pub task_failure_count: u32,
}

#[derive(Debug, Clone)]
pub struct AgentTask {
    pub spec: TaskSpecification,
    pub state: TaskState,
    /// Connection running the task; set iff the task is running
    pub owner: Option<Handle>,
    pub owner_is_remote: bool,
    pub worker: Option<AgentInfo>,
    pub assigned_at: Option<Instant>,
    pub started_at: Option<Instant>,
    pub stopped_at: Option<Instant>,
}

impl AgentTask {
    fn new(spec: TaskSpecification) -> Self {
        Self {
            spec,
            state: TaskState::Idle,
            owner: None,
            owner_is_remote: false,
            worker: None,
            assigned_at: None,
            started_at: None,
            stopped_at: None,
        }
    }
}

#[derive(Default)]
struct JobInner {
    state: JobState,
    success: SuccessState,
    specs: Option<JobSpecifications>,
    reservations: u32,
    stats: JobStats,
    process: Option<RunningProcess>,
    replay: Option<ReplayPlan>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl JobInner {
    fn flags(&self) -> JobFlags {
        self.specs.as_ref().and_then(|s| s.effective()).map(|s| s.flags).unwrap_or_default()
    }

    /// Tasks handed out by the agent, as opposed to a self-managed process
    fn is_task_based(&self) -> bool {
        self.specs.is_some()
            && !self.flags().contains(JobFlags::MANUAL_START)
            && self.stats.task_count > 0
    }
}

/// What closing a job produced
#[derive(Debug, Default)]
pub struct JobClose {
    pub messages: Vec<Message>,
    /// Replay record, for a successful job owned by the instigator
    pub record: Option<AgentJobRecord>,
}

pub struct AgentJob {
    pub guid: JobGuid,
    pub owner: Handle,
    pub owner_is_instigator: bool,
    settings: JobSettings,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    pending: RwStack<AgentTask>,
    running: RwMap<TaskGuid, AgentTask>,
    retired: RwQueue<AgentTask>,
    inner: Mutex<JobInner>,
}

impl AgentJob {
    pub fn new(
        guid: JobGuid,
        owner: Handle,
        owner_is_instigator: bool,
        settings: JobSettings,
        telemetry: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guid,
            owner,
            owner_is_instigator,
            settings,
            telemetry,
            clock,
            pending: RwStack::new(),
            running: RwMap::new(),
            retired: RwQueue::new(),
            inner: Mutex::new(JobInner::default()),
        }
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    pub fn success(&self) -> SuccessState {
        self.inner.lock().success
    }

    pub fn stats(&self) -> JobStats {
        self.inner.lock().stats
    }

    pub fn reservations(&self) -> u32 {
        self.inner.lock().reservations
    }

    pub fn specs(&self) -> Option<JobSpecifications> {
        self.inner.lock().specs.clone()
    }

    pub fn effective_spec(&self) -> Option<JobSpecification> {
        self.inner.lock().specs.as_ref().and_then(|s| s.effective().cloned())
    }

    pub fn flags(&self) -> JobFlags {
        self.inner.lock().flags()
    }

    pub fn process(&self) -> Option<RunningProcess> {
        self.inner.lock().process.clone()
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.inner.lock().stopped_at
    }

    pub fn is_deterministic(&self) -> bool {
        self.inner.lock().replay.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Pending task specifications, bottom of the stack first
    pub fn pending_specs(&self) -> Vec<TaskSpecification> {
        self.pending.snapshot().into_iter().map(|t| t.spec).collect()
    }

    pub fn running_tasks(&self) -> Vec<AgentTask> {
        self.running.values()
    }

    pub fn retired_tasks(&self) -> Vec<AgentTask> {
        self.retired.snapshot()
    }

    pub fn entry(&self) -> JobEntry {
        let inner = self.inner.lock();
        JobEntry {
            guid: self.guid,
            owner: self.owner,
            owner_is_instigator: self.owner_is_instigator,
            state: inner.state,
            success: inner.success,
            pending: self.pending.len(),
            running: self.running.len(),
            retired: self.retired.len(),
        }
    }

    /// Store the specification; the job becomes pending
    pub fn set_specs(&self, specs: JobSpecifications) {
        let mut inner = self.inner.lock();
        inner.specs = Some(specs);
        inner.state = JobState::Pending;
    }

    pub fn set_process(&self, process: RunningProcess) {
        self.inner.lock().process = Some(process);
    }

    pub fn set_replay(&self, plan: ReplayPlan) {
        self.inner.lock().replay = Some(plan);
    }

    /// Queue a new task and offer it to any outstanding reservation
    pub fn add_task(&self, table: &ConnectionTable, spec: TaskSpecification) -> Vec<Message> {
        let mut inner = self.inner.lock();
        self.pending.push(AgentTask::new(spec));
        inner.stats.task_count += 1;
        let mut out = Vec::new();
        self.check_reservations_locked(&mut inner, table, &mut out);
        out
    }

    /// Sort pending tasks by descending cost and stripe them across `lanes`,
    /// leaving the first task to hand out on top of the stack
    pub fn order_pending(&self, lanes: usize) {
        let _inner = self.inner.lock();
        let tasks = self.pending.drain();
        let ordered = distribution_order(tasks, lanes, |t| t.spec.cost);
        self.pending.replace(ordered.into_iter().rev());
    }

    /// The process is up; report Running to the instigator
    pub fn mark_running(&self) -> Vec<Message> {
        let mut inner = self.inner.lock();
        inner.state = JobState::Running;
        inner.started_at = Some(self.clock.now());
        let mut out = Vec::new();
        if self.owner_is_instigator {
            out.push(self.to_owner(MessageBody::JobState {
                job: self.guid,
                state: JobReport::Running,
                exit_code: 0,
                running_time: 0.0,
                text: None,
            }));
            self.telemetry.update_machine_state(
                &self.settings.machine,
                MachineState::TaskTotal(inner.stats.task_count),
            );
        }
        out
    }

    /// Answer a TASK_REQUEST from `requester`
    pub fn get_next_task(&self, table: &ConnectionTable, requester: &Connection) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let reply = |response| {
            Message::routed(
                self.owner,
                requester.handle,
                MessageBody::TaskRequestResponse { response },
            )
        };
        match inner.state {
            JobState::Running => {
                if let Some(task) = self.assign_locked(&mut inner, table, requester) {
                    return vec![reply(TaskResponse::Specification { job: self.guid, task })];
                }
                if !self.owner_is_instigator || requester.is_local() {
                    inner.reservations += 1;
                    requester.lock().reservations += 1;
                    tracing::debug!(
                        job = %self.guid,
                        requester = %requester.handle,
                        reservations = inner.reservations,
                        "task reservation recorded"
                    );
                    if requester.is_local() {
                        return vec![reply(TaskResponse::Reservation { job: self.guid })];
                    }
                    Vec::new()
                } else {
                    vec![reply(TaskResponse::Release { job: self.guid })]
                }
            }
            JobState::Closed => vec![reply(TaskResponse::Release { job: self.guid })],
            JobState::Unspecified | JobState::Pending => Vec::new(),
        }
    }

    /// Assign every task the replay plan holds for `requester`
    pub fn take_replay_tasks(
        &self,
        table: &ConnectionTable,
        requester: &Connection,
    ) -> Vec<TaskSpecification> {
        let mut inner = self.inner.lock();
        if inner.replay.is_none() || inner.state != JobState::Running {
            return Vec::new();
        }
        let mut tasks = Vec::new();
        while let Some(task) = self.assign_locked(&mut inner, table, requester) {
            tasks.push(task);
        }
        tasks
    }

    /// Satisfy outstanding reservations from pending work, or release them
    /// all once the job is closed
    pub fn check_for_reservations(&self, table: &ConnectionTable) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        self.check_reservations_locked(&mut inner, table, &mut out);
        out
    }

    /// Drop the reservations a departing connection held
    pub fn cancel_reservations(&self, connection: &Connection) {
        let mut inner = self.inner.lock();
        let mut conn = connection.lock();
        inner.reservations = inner.reservations.saturating_sub(conn.reservations);
        conn.reservations = 0;
    }

    /// Apply a TASK_STATE report for a running task
    pub fn update_task_state(
        &self,
        table: &ConnectionTable,
        guid: TaskGuid,
        state: TaskState,
    ) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        self.update_task_locked(&mut inner, table, guid, state, &mut out);
        out
    }

    /// Every running task owned by `handle` is reported killed
    pub fn kill_tasks_owned_by(&self, table: &ConnectionTable, handle: Handle) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let owned: Vec<TaskGuid> = self.running.with_read(|m| {
            m.values().filter(|t| t.owner == Some(handle)).map(|t| t.spec.guid).collect()
        });
        let mut out = Vec::new();
        for guid in owned {
            self.update_task_locked(&mut inner, table, guid, TaskState::Killed, &mut out);
        }
        out
    }

    /// The job's executable exited
    pub fn process_exited(&self, exit_code: i32) -> Vec<Message> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        if inner.success != SuccessState::Incomplete {
            return out;
        }
        if inner.is_task_based() {
            if exit_code != 0 {
                let text = format!("Job has failed! Process exited with code {exit_code}");
                self.settle_locked(&mut inner, SuccessState::Failure, &text, exit_code, &mut out);
            }
        } else if exit_code == 0 {
            self.settle_locked(&mut inner, SuccessState::Success, "", exit_code, &mut out);
        } else {
            let text = format!("Job has failed! Process exited with code {exit_code}");
            self.settle_locked(&mut inner, SuccessState::Failure, &text, exit_code, &mut out);
        }
        out
    }

    /// Close the job: release reservations and settle the outcome
    pub fn close(&self, table: &ConnectionTable) -> JobClose {
        let mut inner = self.inner.lock();
        let mut result = JobClose::default();
        if inner.state == JobState::Closed {
            return result;
        }
        inner.state = JobState::Closed;
        inner.stopped_at = Some(self.clock.now());
        self.check_reservations_locked(&mut inner, table, &mut result.messages);

        if inner.success == SuccessState::Incomplete {
            let failure = if !inner.is_task_based() {
                None
            } else if !self.pending.is_empty() {
                Some("Job has failed! Job is closed while Tasks are still PENDING")
            } else if !self.running.is_empty() {
                Some("Job has failed! Job is closed while Tasks are still RUNNING")
            } else if inner.stats.task_failure_count > 0 {
                Some("Job has failed! Not all Tasks reported success")
            } else {
                None
            };
            let (success, text) = match failure {
                Some(text) => (SuccessState::Failure, text),
                None => (SuccessState::Success, ""),
            };
            self.settle_locked(&mut inner, success, text, 0, &mut result.messages);
        }

        if self.owner_is_instigator {
            self.telemetry
                .update_machine_state(&self.settings.machine, MachineState::InstigatorDisconnected);
            self.log_task_timing(&inner);
            if inner.success == SuccessState::Success {
                result.record = self.build_record(&inner);
            }
        }
        tracing::info!(job = %self.guid, success = %inner.success, "job closed");
        result
    }

    fn to_owner(&self, body: MessageBody) -> Message {
        Message::routed(self.owner, self.owner, body)
    }

    /// Pop the next task for `requester` and move it to running
    fn assign_locked(
        &self,
        inner: &mut JobInner,
        table: &ConnectionTable,
        requester: &Connection,
    ) -> Option<TaskSpecification> {
        if self.avoids(table, requester) {
            return None;
        }
        let machine = requester.machine_name(&self.settings.machine);
        let mut task = match inner.replay.as_mut() {
            Some(plan) => loop {
                let guid = plan.next_for(&machine)?;
                if let Some(task) = self.pending.remove_where(|t| t.spec.guid == guid) {
                    break task;
                }
            },
            None => self.pending.pop()?,
        };
        task.owner = Some(requester.handle);
        task.owner_is_remote = requester.is_remote();
        task.worker = Some(match requester.as_remote() {
            Some(remote) => remote.info.clone(),
            None => AgentInfo { name: machine, ..Default::default() },
        });
        task.assigned_at = Some(self.clock.now());
        if requester.is_remote() {
            inner.stats.task_count_remote += 1;
        }
        let spec = task.spec.clone();
        self.running.insert(spec.guid, task);
        tracing::debug!(
            job = %self.guid,
            task = %spec.guid,
            owner = %requester.handle,
            "task assigned"
        );
        Some(spec)
    }

    /// Local workers stand aside while remote ones are attached
    fn avoids(&self, table: &ConnectionTable, requester: &Connection) -> bool {
        if !self.settings.avoid_local || !requester.is_local() {
            return false;
        }
        table.get(self.owner).is_some_and(|owner| !owner.lock().remote_children.is_empty())
    }

    fn check_reservations_locked(
        &self,
        inner: &mut JobInner,
        table: &ConnectionTable,
        out: &mut Vec<Message>,
    ) {
        if inner.reservations == 0 {
            return;
        }
        let Some(owner) = table.get(self.owner) else {
            return;
        };
        let (local_children, remote_children) = {
            let o = owner.lock();
            (o.local_children.clone(), o.remote_children.clone())
        };
        let children: Vec<Arc<Connection>> = local_children
            .iter()
            .chain(remote_children.iter())
            .filter_map(|h| table.get(*h))
            .collect();

        match inner.state {
            JobState::Running => {
                for child in children {
                    while inner.reservations > 0
                        && child.reservations() > 0
                        && !self.pending.is_empty()
                    {
                        let Some(task) = self.assign_locked(inner, table, &child) else {
                            break;
                        };
                        inner.reservations -= 1;
                        child.lock().reservations -= 1;
                        out.push(Message::routed(
                            self.owner,
                            child.handle,
                            MessageBody::TaskRequestResponse {
                                response: TaskResponse::Specification { job: self.guid, task },
                            },
                        ));
                    }
                }
            }
            JobState::Closed => {
                for child in children {
                    let held = std::mem::take(&mut child.lock().reservations);
                    if held == 0 {
                        continue;
                    }
                    inner.reservations = inner.reservations.saturating_sub(held);
                    out.push(Message::routed(
                        self.owner,
                        child.handle,
                        MessageBody::TaskRequestResponse {
                            response: TaskResponse::Release { job: self.guid },
                        },
                    ));
                }
            }
            JobState::Unspecified | JobState::Pending => {}
        }
    }

    fn update_task_locked(
        &self,
        inner: &mut JobInner,
        table: &ConnectionTable,
        guid: TaskGuid,
        state: TaskState,
        out: &mut Vec<Message>,
    ) {
        let Some(mut task) = self.running.get(&guid) else {
            tracing::debug!(job = %self.guid, task = %guid, %state, "state for task not running");
            return;
        };
        let now = self.clock.now();
        match state {
            TaskState::Idle | TaskState::Accepted => {
                task.state = state;
                self.running.insert(guid, task);
            }
            TaskState::Running => {
                task.state = state;
                task.started_at = Some(now);
                self.running.insert(guid, task);
            }
            TaskState::Success => {
                self.retire(&mut task, state, now);
                inner.stats.task_success_count += 1;
            }
            TaskState::Failure => {
                self.retire(&mut task, state, now);
                inner.stats.task_failure_count += 1;
            }
            TaskState::Rejected | TaskState::Killed if task.owner_is_remote => {
                self.running.remove(&guid);
                task.state = TaskState::Idle;
                task.owner = None;
                task.owner_is_remote = false;
                task.worker = None;
                task.assigned_at = None;
                task.started_at = None;
                inner.stats.task_count_remote = inner.stats.task_count_remote.saturating_sub(1);
                inner.stats.task_count_requeue += 1;
                self.pending.push(task);
                tracing::info!(job = %self.guid, task = %guid, state = %state, "task requeued");
                self.check_reservations_locked(inner, table, out);
            }
            TaskState::Rejected | TaskState::Killed => {
                self.retire(&mut task, state, now);
                inner.stats.task_failure_count += 1;
            }
        }

        if inner.success == SuccessState::Incomplete {
            if inner.stats.task_failure_count > 0 {
                let text = format!("Job has failed! Task {guid} reported {state}");
                self.settle_locked(inner, SuccessState::Failure, &text, 0, out);
            } else if self.owner_is_instigator
                && inner.stats.task_success_count == inner.stats.task_count
            {
                self.settle_locked(inner, SuccessState::Success, "", 0, out);
            }
        }

        if self.owner_is_instigator {
            let machine = &self.settings.machine;
            let completed = MachineState::TasksCompleted(self.retired.len() as u32);
            let in_progress = MachineState::TasksInProgress(self.running.len() as u32);
            self.telemetry.update_machine_state(machine, completed);
            self.telemetry.update_machine_state(machine, in_progress);
        }
    }

    fn retire(&self, task: &mut AgentTask, state: TaskState, now: Instant) {
        self.running.remove(&task.spec.guid);
        task.state = state;
        task.owner = None;
        task.stopped_at = Some(now);
        self.retired.push(task.clone());
    }

    /// Set the success state once and tell the instigator
    fn settle_locked(
        &self,
        inner: &mut JobInner,
        success: SuccessState,
        text: &str,
        exit_code: i32,
        out: &mut Vec<Message>,
    ) {
        if inner.success != SuccessState::Incomplete || success == SuccessState::Incomplete {
            return;
        }
        inner.success = success;
        tracing::info!(job = %self.guid, success = %success, "job outcome settled");
        if !self.owner_is_instigator {
            return;
        }
        let running_time = inner
            .started_at
            .map(|t| self.clock.now().saturating_duration_since(t).as_secs_f32())
            .unwrap_or_default();
        let (text, report, colour) = match success {
            SuccessState::Success => {
                ("Job is a success!".to_string(), JobReport::Success, LogColour::Green)
            }
            _ => (text.to_string(), JobReport::Failure, LogColour::Red),
        };
        self.telemetry.log(Verbosity::Informative, colour, &text);
        out.push(self.to_owner(MessageBody::info(text.clone())));
        out.push(self.to_owner(MessageBody::JobState {
            job: self.guid,
            state: report,
            exit_code,
            running_time,
            text: Some(text),
        }));
    }

    fn build_record(&self, inner: &JobInner) -> Option<AgentJobRecord> {
        let spec = inner.specs.as_ref()?.effective()?;
        let executable = spec.original_name(&spec.executable);
        let assignments = self
            .retired
            .snapshot()
            .into_iter()
            .filter_map(|t| {
                Some(Assignment {
                    worker: t.worker?,
                    assigned_at: t.assigned_at?,
                    task: RecordedTask {
                        guid: t.spec.guid,
                        parameters: t.spec.parameters,
                        cost: t.spec.cost,
                    },
                })
            })
            .collect();
        Some(build_record(executable, assignments))
    }

    fn log_task_timing(&self, inner: &JobInner) {
        let Some(job_start) = inner.started_at else {
            return;
        };
        let mut tasks = self.retired.snapshot();
        tasks.sort_by_key(|t| t.assigned_at);
        for task in tasks {
            let since = |t: Option<Instant>| {
                t.map(|t| t.saturating_duration_since(job_start).as_secs_f32()).unwrap_or_default()
            };
            let worker = task.worker.as_ref().map(|w| w.name.as_str()).unwrap_or("?");
            self.telemetry.log(
                Verbosity::Verbose,
                LogColour::Normal,
                &format!(
                    "task {} on {worker}: assigned {:.2}s, started {:.2}s, stopped {:.2}s ({})",
                    task.spec.guid,
                    since(task.assigned_at),
                    since(task.started_at),
                    since(task.stopped_at),
                    task.state,
                ),
            );
        }
    }
}

/// Every job this agent knows, plus the last successful distribution
#[derive(Default)]
pub struct JobTable {
    jobs: RwMap<JobGuid, Arc<AgentJob>>,
    last_record: Mutex<Option<AgentJobRecord>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guid: JobGuid) -> Option<Arc<AgentJob>> {
        self.jobs.get(&guid)
    }

    pub fn insert(&self, job: Arc<AgentJob>) -> Option<Arc<AgentJob>> {
        self.jobs.insert(job.guid, job)
    }

    pub fn remove(&self, guid: JobGuid) -> Option<Arc<AgentJob>> {
        self.jobs.remove(&guid)
    }

    pub fn all(&self) -> Vec<Arc<AgentJob>> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn last_record(&self) -> Option<AgentJobRecord> {
        self.last_record.lock().clone()
    }

    pub fn set_last_record(&self, record: Option<AgentJobRecord>) {
        *self.last_record.lock() = record;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
