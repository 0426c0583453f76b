// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use swarm_core::test_support::tasks_with_costs;

fn agent(name: &str) -> AgentInfo {
    let ip = "10.0.0.1".to_string();
    AgentInfo { name: name.to_string(), ip, port: 8008, ..Default::default() }
}

fn assignment(task: &TaskSpecification, worker: &str, base: Instant, offset_ms: u64) -> Assignment {
    Assignment {
        task: RecordedTask {
            guid: task.guid,
            parameters: task.parameters.clone(),
            cost: task.cost,
        },
        worker: agent(worker),
        assigned_at: base + Duration::from_millis(offset_ms),
    }
}

fn sample() -> (Vec<TaskSpecification>, AgentJobRecord) {
    let tasks = tasks_with_costs(&[30, 20, 10]);
    let base = Instant::now();
    let record = build_record(
        "worker.bin",
        vec![
            assignment(&tasks[2], "alpha", base, 30),
            assignment(&tasks[0], "alpha", base, 10),
            assignment(&tasks[1], "beta", base, 20),
        ],
    );
    (tasks, record)
}

#[test]
fn record_groups_by_worker_in_assignment_order() {
    let (tasks, record) = sample();
    assert_eq!(record.executable, "worker.bin");
    assert_eq!(record.workers.len(), 2);
    assert_eq!(record.workers[0].agent.name, "alpha");
    assert_eq!(record.workers[0].tasks, vec![tasks[0].guid, tasks[2].guid]);
    assert_eq!(record.workers[1].tasks, vec![tasks[1].guid]);
    assert_eq!(record.tasks.len(), 3);
}

#[test]
fn remote_workers_skip_own_name() {
    let (_, record) = sample();
    let names: Vec<_> = record.remote_workers("alpha").map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["beta"]);
}

#[test]
fn matching_tasks_produce_per_worker_queues() {
    let (tasks, record) = sample();
    let mut plan = plan_replay(&record, "worker.bin", &tasks).unwrap();
    assert_eq!(plan.remaining("alpha"), 2);
    assert_eq!(plan.next_for("alpha"), Some(tasks[0].guid));
    assert_eq!(plan.next_for("alpha"), Some(tasks[2].guid));
    assert_eq!(plan.next_for("alpha"), None);
    assert_eq!(plan.next_for("beta"), Some(tasks[1].guid));
    assert_eq!(plan.next_for("gamma"), None);
}

#[test]
fn task_order_in_submission_does_not_matter() {
    let (mut tasks, record) = sample();
    tasks.reverse();
    assert!(plan_replay(&record, "worker.bin", &tasks).is_ok());
}

#[test]
fn changed_executable_is_rejected() {
    let (tasks, record) = sample();
    let err = plan_replay(&record, "other.bin", &tasks).unwrap_err();
    assert!(matches!(err, ReplayMismatch::Executable { .. }));
}

#[test]
fn changed_task_count_is_rejected() {
    let (mut tasks, record) = sample();
    tasks.pop();
    assert_eq!(
        plan_replay(&record, "worker.bin", &tasks).unwrap_err(),
        ReplayMismatch::TaskCount { recorded: 3, current: 2 }
    );
}

#[test]
fn changed_cost_is_rejected() {
    let (mut tasks, record) = sample();
    tasks[1].cost += 1;
    assert_eq!(
        plan_replay(&record, "worker.bin", &tasks).unwrap_err(),
        ReplayMismatch::Task(tasks[1].guid)
    );
}

#[test]
fn changed_parameters_are_rejected() {
    let (mut tasks, record) = sample();
    tasks[0].parameters = "something else".to_string();
    assert!(matches!(
        plan_replay(&record, "worker.bin", &tasks),
        Err(ReplayMismatch::Task(_))
    ));
}

#[test]
fn unknown_guid_is_rejected() {
    let (mut tasks, record) = sample();
    tasks[2] = TaskSpecification::new(tasks[2].parameters.clone(), tasks[2].cost);
    assert!(matches!(
        plan_replay(&record, "worker.bin", &tasks),
        Err(ReplayMismatch::Task(_))
    ));
}
