// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{agent_info, RecordingPeer};
use std::time::{Duration, Instant};
use swarm_adapters::{FakeLauncher, RecordingTelemetry};
use swarm_core::test_support::tasks_with_costs;
use swarm_core::{AgentConfig, FakeClock, JobReport, Message, MessageBody, SuccessState};
use swarm_core::{TaskResponse, TaskState};
use swarm_storage::ChannelCache;
use swarm_wire::PeerRequest;
use tokio_util::sync::CancellationToken;

const OWNER: Handle = Handle(1);
const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    _dir: tempfile::TempDir,
    connections: Arc<ConnectionTable>,
    router: Arc<Router>,
    launcher: FakeLauncher,
    clock: FakeClock,
    scheduler: Scheduler,
    shutdown: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ChannelCache::open(dir.path().join("cache")).unwrap());
        let connections = Arc::new(ConnectionTable::new());
        let jobs = Arc::new(JobTable::new());
        let clock = FakeClock::new();
        let shutdown = CancellationToken::new();
        let router = Arc::new(Router::new(
            connections.clone(),
            jobs.clone(),
            Arc::new(clock.clone()),
            shutdown.clone(),
        ));
        tokio::spawn(router.clone().run());
        let channels = Arc::new(ChannelService::new(cache, connections.clone()));
        let launcher = FakeLauncher::new();
        let config = AgentConfig::default()
            .agent_name("alpha")
            .local_cores(1)
            .remote_cores(1)
            .job_executable_timeout_secs(30);
        let scheduler = Scheduler::new(
            connections.clone(),
            jobs,
            router.clone(),
            channels,
            Arc::new(launcher.clone()),
            Arc::new(RecordingTelemetry::new()),
            Arc::new(clock.clone()),
            Arc::new(parking_lot::RwLock::new(config)),
        );
        Self { _dir: dir, connections, router, launcher, clock, scheduler, shutdown }
    }

    fn cache(&self) -> &Arc<ChannelCache> {
        self.scheduler.channels.cache()
    }

    fn local(&self, handle: Handle, parent: Option<Handle>) -> Arc<Connection> {
        let conn = Arc::new(Connection::local(handle, 500 + handle.0 as u32, Instant::now()));
        conn.set_state(ConnectionState::Connected);
        if let Some(parent) = parent.and_then(|p| self.connections.get(p)) {
            conn.lock().parent = Some(parent.handle);
            conn.lock().job = parent.job();
            parent.lock().local_children.push(conn.handle);
        }
        self.connections.insert(conn.clone());
        conn
    }

    fn remote_child(&self, handle: Handle, peer: Arc<RecordingPeer>) -> Arc<Connection> {
        let conn =
            Arc::new(Connection::remote(handle, agent_info("beta"), peer, Instant::now()));
        conn.set_state(ConnectionState::Connected);
        conn.lock().parent = Some(OWNER);
        if let Some(owner) = self.connections.get(OWNER) {
            conn.lock().job = owner.job();
            owner.lock().remote_children.push(handle);
        }
        self.connections.insert(conn.clone());
        conn
    }

    /// Owner connection with an opened, specified job whose files are cached
    async fn specified(&self, spec: JobSpecification) -> Arc<AgentJob> {
        self.local(OWNER, None);
        for (name, _) in spec.all_channels() {
            self.cache().store_channel(name, name.as_bytes()).unwrap();
        }
        let job = self.scheduler.open_job(OWNER, JobGuid::new()).unwrap();
        self.scheduler
            .begin_job_specification(OWNER, JobSpecifications::single(spec))
            .await
            .unwrap();
        job
    }

    async fn next(&self, handle: Handle) -> Message {
        self.router.get_message(handle, WAIT).await.unwrap().unwrap()
    }

    /// Wait for the owner's JOB_STATE report
    async fn job_report(&self) -> JobReport {
        loop {
            if let MessageBody::JobState { state, .. } = self.next(OWNER).await.body {
                if state != JobReport::Running {
                    return state;
                }
            }
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn handed_out(messages: &[Message]) -> Vec<u32> {
    messages
        .iter()
        .filter_map(|m| match &m.body {
            MessageBody::TaskRequestResponse {
                response: TaskResponse::Specification { task, .. },
            } => Some(task.cost),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn open_job_creates_a_scratch_folder() {
    let h = Harness::new();
    let owner = h.local(OWNER, None);
    let guid = JobGuid::new();
    let job = h.scheduler.open_job(OWNER, guid).unwrap();

    assert!(job.owner_is_instigator);
    assert_eq!(job.state(), JobState::Unspecified);
    assert_eq!(owner.job(), Some(guid));
    assert!(h.cache().job_dir(guid).is_dir());

    let again = h.scheduler.open_job(OWNER, JobGuid::new());
    assert!(matches!(again, Err(AgentError::JobError(_))));
}

#[tokio::test]
async fn missing_required_dependency_keeps_the_job_unspecified() {
    let h = Harness::new();
    h.local(OWNER, None);
    h.cache().store_channel("solver.bin", b"exe").unwrap();
    let job = h.scheduler.open_job(OWNER, JobGuid::new()).unwrap();
    let spec = JobSpecification::builder()
        .executable("solver.bin")
        .required_dependencies(vec!["solver.dll".to_string()])
        .build();

    let result =
        h.scheduler.begin_job_specification(OWNER, JobSpecifications::single(spec)).await;
    assert_eq!(result, Err(AgentError::ChannelNotFound("solver.dll".to_string())));
    assert_eq!(job.state(), JobState::Unspecified);
    assert!(h.launcher.launches().is_empty());
}

#[tokio::test]
async fn missing_optional_dependency_is_tolerated() {
    let h = Harness::new();
    h.local(OWNER, None);
    h.cache().store_channel("solver.bin", b"exe").unwrap();
    let job = h.scheduler.open_job(OWNER, JobGuid::new()).unwrap();
    let spec = JobSpecification::builder()
        .executable("solver.bin")
        .optional_dependencies(vec!["extras.dat".to_string()])
        .build();

    h.scheduler.begin_job_specification(OWNER, JobSpecifications::single(spec)).await.unwrap();
    assert_eq!(job.state(), JobState::Pending);
}

#[tokio::test]
async fn tasks_wait_for_a_specification() {
    let h = Harness::new();
    h.local(OWNER, None);
    h.scheduler.open_job(OWNER, JobGuid::new()).unwrap();
    let result = h.scheduler.add_tasks(OWNER, tasks_with_costs(&[1]));
    assert!(matches!(result, Err(AgentError::JobError(_))));
}

#[tokio::test]
async fn workers_cannot_add_tasks() {
    let h = Harness::new();
    h.specified(JobSpecification::builder().build()).await;
    h.local(Handle(2), Some(OWNER));
    let result = h.scheduler.add_tasks(Handle(2), tasks_with_costs(&[1]));
    assert!(matches!(result, Err(AgentError::JobError(_))));
}

#[tokio::test]
async fn started_job_hands_out_the_most_expensive_task_first() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.add_tasks(OWNER, tasks_with_costs(&[10, 50, 20])).unwrap();
    h.scheduler.order_pending(&job);
    h.scheduler.start_job(&job).unwrap();
    let worker = h.local(Handle(2), Some(OWNER));

    let costs: Vec<u32> = (0..3)
        .flat_map(|_| handed_out(&job.get_next_task(&h.connections, &worker)))
        .collect();
    assert_eq!(costs, vec![50, 20, 10]);
}

#[tokio::test]
async fn start_launches_in_the_job_folder() {
    let h = Harness::new();
    let mut spec = JobSpecification::builder()
        .executable("cache-name.bin")
        .required_dependencies(vec!["lib.so".to_string()])
        .build();
    spec.original_names.insert("cache-name.bin".to_string(), "solver".to_string());
    let job = h.specified(spec).await;
    h.scheduler.start_job(&job).unwrap();

    let launch = &h.launcher.launches()[0];
    let job_dir = h.cache().job_dir(job.guid);
    assert_eq!(launch.program, job_dir.join("solver"));
    assert_eq!(launch.working_dir, job_dir);
    assert_eq!(launch.env, vec![(MAX_CORES_ENV.to_string(), "1".to_string())]);
    assert!(job_dir.join("lib.so").is_file());
    assert_eq!(job.state(), JobState::Running);
    assert_eq!(job.process().map(|p| p.pid()), h.launcher.last().map(|p| p.pid()));
}

#[tokio::test]
async fn manual_start_launches_nothing() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().flags(JobFlags::MANUAL_START).build()).await;
    h.scheduler.start_job(&job).unwrap();
    assert!(h.launcher.launches().is_empty());
    assert_eq!(job.state(), JobState::Running);
}

#[tokio::test]
async fn launch_failure_is_a_job_error() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.launcher.set_fail_launch(true);
    assert!(matches!(h.scheduler.start_job(&job), Err(AgentError::JobError(_))));
    assert_eq!(job.state(), JobState::Pending);
}

#[tokio::test]
async fn failing_executable_fails_a_task_job() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.add_tasks(OWNER, tasks_with_costs(&[1])).unwrap();
    h.scheduler.start_job(&job).unwrap();

    h.launcher.last().unwrap().exit(3);
    assert_eq!(h.job_report().await, JobReport::Failure);
    assert_eq!(job.success(), SuccessState::Failure);
}

#[tokio::test]
async fn clean_exit_completes_a_taskless_job() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.start_job(&job).unwrap();

    h.launcher.last().unwrap().exit(0);
    assert_eq!(h.job_report().await, JobReport::Success);
}

#[tokio::test]
async fn close_forwards_to_remote_workers_and_records_success() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.add_tasks(OWNER, tasks_with_costs(&[5])).unwrap();
    h.scheduler.start_job(&job).unwrap();
    let peer = RecordingPeer::new();
    let worker = h.remote_child(Handle(7), peer.clone());

    let task = job.get_next_task(&h.connections, &worker);
    let guid = match &task[0].body {
        MessageBody::TaskRequestResponse { response: TaskResponse::Specification { task, .. } } => {
            task.guid
        }
        other => panic!("expected a task, got {other:?}"),
    };
    job.update_task_state(&h.connections, guid, TaskState::Success);

    h.scheduler.close_job(OWNER).await.unwrap();
    assert_eq!(job.state(), JobState::Closed);
    assert_eq!(job.success(), SuccessState::Success);
    let calls = peer.calls();
    assert!(matches!(calls.as_slice(), [PeerRequest::CloseJob { handle }] if *handle == Handle(7)));
    let record = h.scheduler.jobs().last_record().unwrap();
    assert_eq!(record.workers[0].agent.name, "beta");
}

#[tokio::test]
async fn only_the_owner_closes_a_job() {
    let h = Harness::new();
    h.specified(JobSpecification::builder().build()).await;
    h.local(Handle(2), Some(OWNER));
    let result = h.scheduler.close_job(Handle(2)).await;
    assert!(matches!(result, Err(AgentError::InvalidArgument(_))));
}

#[tokio::test]
async fn departing_remote_worker_gives_its_tasks_back() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.add_tasks(OWNER, tasks_with_costs(&[5, 6])).unwrap();
    h.scheduler.start_job(&job).unwrap();
    let worker = h.remote_child(Handle(7), RecordingPeer::new());
    job.get_next_task(&h.connections, &worker);
    assert_eq!(job.running_len(), 1);

    h.scheduler.release_connection(&worker);
    assert_eq!(job.running_len(), 0);
    assert_eq!(job.pending_len(), 2);
    assert_eq!(job.stats().task_count_requeue, 1);
}

#[tokio::test]
async fn closed_job_process_is_killed_after_the_timeout() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    h.scheduler.start_job(&job).unwrap();
    h.scheduler.close_job(OWNER).await.unwrap();
    let process = h.launcher.last().unwrap();

    assert_eq!(h.scheduler.maintain_jobs(), 0);
    assert!(!process.was_killed());

    h.clock.advance(Duration::from_secs(31));
    assert_eq!(h.scheduler.maintain_jobs(), 0);
    assert!(process.was_killed());

    job.process().unwrap().wait().await;
    assert_eq!(h.scheduler.maintain_jobs(), 1);
    assert!(h.scheduler.jobs().is_empty());
}

#[tokio::test]
async fn replay_needs_a_recorded_job() {
    let h = Harness::new();
    let job = h.specified(JobSpecification::builder().build()).await;
    assert_eq!(h.scheduler.replay_plan(&job), Err(ReplayMismatch::NoRecord));
}
