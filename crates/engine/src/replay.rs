// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic replay of the previous successful distribution.
//!
//! Both directions are pure: [`build_record`] snapshots who ran what, and
//! [`plan_replay`] checks a new task list against that snapshot.

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::time::Instant;
use swarm_core::{AgentInfo, TaskGuid, TaskSpecification};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTask {
    pub guid: TaskGuid,
    pub parameters: String,
    pub cost: u32,
}

/// Tasks one worker ran, in assignment order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub agent: AgentInfo,
    pub tasks: Vec<TaskGuid>,
}

/// Final assignment of a successful job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentJobRecord {
    /// Original file name of the executable
    pub executable: String,
    pub tasks: Vec<RecordedTask>,
    pub workers: Vec<WorkerRecord>,
}

impl AgentJobRecord {
    /// Workers other than `own_name`, which must be reconnected to replay
    pub fn remote_workers<'a>(&'a self, own_name: &'a str) -> impl Iterator<Item = &'a AgentInfo> {
        self.workers.iter().map(|w| &w.agent).filter(move |a| a.name != own_name)
    }
}

/// One retired task, as seen when the job closes
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task: RecordedTask,
    pub worker: AgentInfo,
    pub assigned_at: Instant,
}

/// Snapshot who ran what, grouping by worker in first-assignment order
pub fn build_record(executable: &str, mut assignments: Vec<Assignment>) -> AgentJobRecord {
    assignments.sort_by_key(|a| a.assigned_at);
    let mut workers: IndexMap<String, WorkerRecord> = IndexMap::new();
    let mut tasks = Vec::with_capacity(assignments.len());
    for a in assignments {
        workers
            .entry(a.worker.name.clone())
            .or_insert_with(|| WorkerRecord { agent: a.worker.clone(), tasks: Vec::new() })
            .tasks
            .push(a.task.guid);
        tasks.push(a.task);
    }
    AgentJobRecord {
        executable: executable.to_string(),
        tasks,
        workers: workers.into_values().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayMismatch {
    #[error("no successful job recorded")]
    NoRecord,

    #[error("executable changed: recorded {recorded}, now {current}")]
    Executable { recorded: String, current: String },

    #[error("task count changed: recorded {recorded}, now {current}")]
    TaskCount { recorded: usize, current: usize },

    #[error("task {0} is new or changed")]
    Task(TaskGuid),
}

/// Per-worker queues of task guids to hand out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayPlan {
    queues: IndexMap<String, VecDeque<TaskGuid>>,
}

impl ReplayPlan {
    /// Next task recorded for `worker`
    pub fn next_for(&mut self, worker: &str) -> Option<TaskGuid> {
        self.queues.get_mut(worker).and_then(VecDeque::pop_front)
    }

    pub fn remaining(&self, worker: &str) -> usize {
        self.queues.get(worker).map_or(0, VecDeque::len)
    }

    pub fn workers(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }
}

/// Check `tasks` against `record` and build the queues to replay.
///
/// The executable and the task set must match exactly: same count, and
/// every guid present with the same parameters and cost.
pub fn plan_replay(
    record: &AgentJobRecord,
    executable: &str,
    tasks: &[TaskSpecification],
) -> Result<ReplayPlan, ReplayMismatch> {
    if record.executable != executable {
        return Err(ReplayMismatch::Executable {
            recorded: record.executable.clone(),
            current: executable.to_string(),
        });
    }
    if record.tasks.len() != tasks.len() {
        let recorded = record.tasks.len();
        return Err(ReplayMismatch::TaskCount { recorded, current: tasks.len() });
    }
    let recorded: IndexMap<TaskGuid, &RecordedTask> =
        record.tasks.iter().map(|t| (t.guid, t)).collect();
    for task in tasks {
        match recorded.get(&task.guid) {
            Some(r) if r.parameters == task.parameters && r.cost == task.cost => {}
            _ => return Err(ReplayMismatch::Task(task.guid)),
        }
    }
    let queues = record
        .workers
        .iter()
        .map(|w| (w.agent.name.clone(), w.tasks.iter().copied().collect()))
        .collect();
    Ok(ReplayPlan { queues })
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
