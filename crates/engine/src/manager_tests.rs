// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::loopback::LoopbackNetwork;
use crate::test_support::{agent_config, agent_info, TestAgent};
use swarm_adapters::FakeCoordinator;
use swarm_core::{AgentConfig, JobSpecification, JobSpecifications};

struct Pair {
    _dir: tempfile::TempDir,
    coordinator: FakeCoordinator,
    network: LoopbackNetwork,
    alpha: TestAgent,
    beta: TestAgent,
}

impl Pair {
    fn new() -> Self {
        Self::with(|config| config)
    }

    /// Two agents on one network; `beta_config` adjusts the worker
    fn with(beta_config: impl FnOnce(AgentConfig) -> AgentConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = FakeCoordinator::new();
        let network = LoopbackNetwork::new();
        let alpha = TestAgent::start(
            agent_config("alpha", &dir.path().join("alpha")),
            &coordinator,
            &network,
        )
        .unwrap();
        let beta = TestAgent::start(
            beta_config(agent_config("beta", &dir.path().join("beta"))),
            &coordinator,
            &network,
        )
        .unwrap();
        Self { _dir: dir, coordinator, network, alpha, beta }
    }

    fn alpha(&self) -> &Arc<ConnectionManager> {
        self.alpha.agent.manager()
    }

    fn beta(&self) -> &Arc<ConnectionManager> {
        self.beta.agent.manager()
    }

    /// A local client on alpha to own jobs
    async fn owner(&self) -> Arc<Connection> {
        self.alpha.launcher.add_running(10, "tool");
        let reply = self.alpha().open_local(10, false).await.unwrap();
        self.alpha.agent.connections().get(reply.handle).unwrap()
    }
}

#[tokio::test]
async fn parentless_local_connection_puts_the_agent_to_work() {
    let pair = Pair::new();
    let reply = pair.alpha().open_local(10, false).await.unwrap();

    assert!(reply.handle.0 >= 1000, "handle comes from the coordinator");
    assert!(reply.is_pure_local);
    assert_eq!(reply.job, None);
    assert_eq!(reply.agent_process_id, std::process::id());
    assert_eq!(pair.alpha().state(), AgentState::Working);
    assert!(pair.coordinator.pings().iter().any(|p| p.state == AgentState::Working));
}

#[tokio::test]
async fn offline_coordinator_falls_back_to_random_handles() {
    let pair = Pair::new();
    pair.coordinator.set_offline(true);
    let first = pair.alpha().open_local(10, false).await.unwrap();
    let second = pair.alpha().open_local(11, false).await.unwrap();

    assert!(first.handle.is_valid() && second.handle.is_valid());
    assert_ne!(first.handle, second.handle);
    assert!(!pair.alpha().coordinator_responding());
}

#[tokio::test]
async fn reconnecting_process_replaces_its_stale_connection() {
    let pair = Pair::new();
    let first = pair.alpha().open_local(10, false).await.unwrap();
    let second = pair.alpha().open_local(10, false).await.unwrap();

    let stale = pair.alpha.agent.connections().get(first.handle).unwrap();
    assert_eq!(stale.state(), ConnectionState::Disconnected);
    let fresh = pair.alpha.agent.connections().get(second.handle).unwrap();
    assert_eq!(fresh.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn spawned_executable_attaches_to_its_job() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let agent = &pair.alpha.agent;
    agent.channels().cache().store_channel("solver", b"exe").unwrap();
    let guid = JobGuid::new();
    agent.open_job(owner.handle, guid).await.unwrap();
    let spec = JobSpecification::builder().executable("solver").build();
    agent.begin_job_specification(owner.handle, JobSpecifications::single(spec)).await.unwrap();
    agent.end_job_specification(owner.handle).await.unwrap();

    let pid = pair.alpha.launcher.last().unwrap().pid();
    let reply = pair.alpha().open_local(pid, false).await.unwrap();
    assert_eq!(reply.job, Some(guid));
    assert!(reply.is_pure_local);
    let child = agent.connections().get(reply.handle).unwrap();
    assert_eq!(child.parent(), Some(owner.handle));
    assert!(owner.lock().local_children.contains(&reply.handle));
}

#[tokio::test]
async fn manual_start_is_matched_by_executable_name() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let agent = &pair.alpha.agent;
    agent.channels().cache().store_channel("solver", b"exe").unwrap();
    let guid = JobGuid::new();
    agent.open_job(owner.handle, guid).await.unwrap();
    let spec =
        JobSpecification::builder().executable("solver").flags(JobFlags::MANUAL_START).build();
    agent.begin_job_specification(owner.handle, JobSpecifications::single(spec)).await.unwrap();
    agent.end_job_specification(owner.handle).await.unwrap();
    assert!(pair.alpha.launcher.launches().is_empty());

    pair.alpha.launcher.add_running(555, "SOLVER");
    let reply = pair.alpha().open_local(555, false).await.unwrap();
    assert_eq!(reply.job, Some(guid));
}

#[tokio::test]
async fn confirmation_for_an_unknown_handle_fails_both_sides() {
    let pair = Pair::new();
    let result = pair.beta().open_remote("alpha", Handle(77), false, 0).await;

    assert_eq!(result, Err(AgentError::ConnectionNotFound));
    assert!(pair.alpha.agent.connections().is_empty());
    assert!(pair.beta.agent.connections().is_empty());
    assert_eq!(pair.beta().state(), AgentState::Available);
}

#[tokio::test]
async fn handshake_commits_the_connection_on_both_sides() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let worker = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap().unwrap();

    assert_eq!(worker.state(), ConnectionState::Connected);
    assert_eq!(worker.parent(), Some(owner.handle));
    assert!(owner.lock().remote_children.contains(&worker.handle));
    assert!(!pair.alpha.agent.connections().is_pending(worker.handle));

    let far = pair.beta.agent.connections().get(worker.handle).unwrap();
    assert!(far.is_remote());
    assert_eq!(far.parent(), None);
    assert_eq!(pair.beta().state(), AgentState::Working);
    assert_eq!(pair.beta().agent_info().working_for.as_deref(), Some("alpha"));
    let states = pair.alpha.telemetry.machine_states("beta");
    assert!(states.contains(&MachineState::RemoteConnected));
}

#[tokio::test]
async fn busy_agent_declines_an_unassigned_request() {
    let pair = Pair::new();
    pair.beta().open_local(20, false).await.unwrap();
    let owner = pair.owner().await;

    let opened = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap();
    assert!(opened.is_none());
    assert_eq!(pair.alpha.agent.connections().len(), 1);
    assert!(owner.lock().remote_children.is_empty());
}

#[tokio::test]
async fn agent_marked_busy_declines() {
    let pair = Pair::new();
    pair.beta().set_state(AgentState::Busy);
    let owner = pair.owner().await;
    let opened = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap();
    assert!(opened.is_none());
    assert!(pair.beta.agent.connections().is_empty());
}

#[tokio::test]
async fn concurrent_instigators_get_one_worker() {
    let pair = Pair::new();
    let gamma = TestAgent::start(
        agent_config("gamma", &pair._dir.path().join("gamma")),
        &pair.coordinator,
        &pair.network,
    )
    .unwrap();
    let alpha_owner = pair.owner().await;
    gamma.launcher.add_running(30, "tool");
    let reply = gamma.agent.manager().open_local(30, false).await.unwrap();
    let gamma_owner = gamma.agent.connections().get(reply.handle).unwrap();

    let (from_alpha, from_gamma) = tokio::join!(
        pair.alpha().try_open_remote(&alpha_owner, agent_info("beta")),
        gamma.agent.manager().try_open_remote(&gamma_owner, agent_info("beta")),
    );
    let accepted = [from_alpha.unwrap(), from_gamma.unwrap()]
        .iter()
        .filter(|worker| worker.is_some())
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(pair.beta.agent.connections().len(), 1);
}

#[tokio::test]
async fn standalone_agent_declines() {
    let pair = Pair::with(|config| config.standalone(true));
    let owner = pair.owner().await;
    let opened = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap();
    assert!(opened.is_none());
}

#[tokio::test]
async fn stale_assignment_is_declined() {
    let pair = Pair::new();
    let fresh = pair.beta().open_remote("alpha", Handle(5), true, 0).await.unwrap();
    assert_eq!(fresh, None);
}

#[tokio::test]
async fn closing_the_owner_cascades_to_the_worker() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let worker = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap().unwrap();

    pair.alpha().close(owner.handle).await.unwrap();
    assert_eq!(owner.state(), ConnectionState::Disconnected);
    assert_eq!(worker.state(), ConnectionState::Disconnected);
    let far = pair.beta.agent.connections().get(worker.handle).unwrap();
    assert_eq!(far.state(), ConnectionState::Disconnected);

    // Closing again is a no-op
    pair.alpha().close(owner.handle).await.unwrap();
}

#[tokio::test]
async fn closed_worker_goes_back_to_the_unavailable_list() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let worker = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap().unwrap();

    pair.alpha().close(worker.handle).await.unwrap();
    let local = owner.as_local().unwrap();
    let parked: Vec<String> =
        local.potential.unavailable.snapshot().into_iter().map(|a| a.name).collect();
    assert_eq!(parked, vec!["beta".to_string()]);
    assert!(owner.lock().remote_children.is_empty());
}

#[tokio::test]
async fn unknown_handle_cannot_be_closed() {
    let pair = Pair::new();
    assert_eq!(pair.alpha().close(Handle(3)).await, Err(AgentError::ConnectionNotFound));
}

#[tokio::test]
async fn exited_process_is_dropped_collected_and_the_agent_goes_idle() {
    let pair = Pair::new();
    let mut idle = pair.alpha().subscribe_idle();
    let owner = pair.owner().await;
    pair.alpha().maintain_connections().await;

    pair.alpha.launcher.remove_running(10);
    let removed = pair.alpha().maintain_connections().await;
    assert_eq!(removed, 1);
    assert!(pair.alpha.agent.connections().get(owner.handle).is_none());
    assert!(idle.has_changed().unwrap());
    assert_eq!(*idle.borrow_and_update(), 1);
    assert_eq!(pair.alpha().state(), AgentState::Available);
}

#[tokio::test]
async fn client_gone_between_ticks_still_idles_the_agent() {
    let pair = Pair::new();
    let mut idle = pair.alpha().subscribe_idle();
    let owner = pair.owner().await;
    assert_eq!(pair.alpha().state(), AgentState::Working);
    pair.alpha().close(owner.handle).await.unwrap();

    let pings = pair.coordinator.pings().len();
    assert_eq!(pair.alpha().maintain_connections().await, 1);
    assert!(idle.has_changed().unwrap());
    assert_eq!(pair.alpha().state(), AgentState::Available);
    assert_eq!(pair.coordinator.pings().len(), pings + 1, "idle heartbeat");
    pair.alpha.clock.advance(IDLE_CACHE_DELAY);
    assert!(pair.alpha().cache_cleanup_due());
}

#[tokio::test]
async fn dropped_remote_connection_is_closed_by_maintenance() {
    let pair = Pair::new();
    let owner = pair.owner().await;
    let worker = pair.alpha().try_open_remote(&owner, agent_info("beta")).await.unwrap().unwrap();

    pair.network.remove("beta");
    worker.signal_dropped();
    pair.alpha().maintain_connections().await;
    assert!(pair.alpha.agent.connections().get(worker.handle).is_none());
    assert!(owner.lock().remote_children.is_empty());
}

#[tokio::test]
async fn idle_cache_cleanup_waits_for_the_delay() {
    let pair = Pair::new();
    assert!(!pair.alpha().cache_cleanup_due());
    pair.alpha.clock.advance(IDLE_CACHE_DELAY);
    assert!(pair.alpha().cache_cleanup_due());
    pair.alpha().cache_cleanup_done();
    assert!(!pair.alpha().cache_cleanup_due());
}

#[tokio::test]
async fn potential_agents_are_filtered_and_recycled() {
    let pair = Pair::new();
    let mut gamma = agent_info("gamma");
    gamma.group = "Default".to_string();
    pair.coordinator.add_agent(gamma);
    let mut closed = agent_info("delta");
    closed.group = "Default".to_string();
    closed.state = AgentState::Closed;
    pair.coordinator.add_agent(closed);
    let owner = pair.owner().await;

    assert_eq!(pair.alpha().reset_potential_agents(&owner).await, 2);
    let first = pair.alpha().next_remote_agent(&owner).unwrap();
    let second = pair.alpha().next_remote_agent(&owner).unwrap();
    assert_eq!(pair.alpha().next_remote_agent(&owner), None);

    pair.alpha().park_unavailable(&owner, first.clone());
    pair.alpha().park_unavailable(&owner, second);
    assert_eq!(pair.alpha().retry_unavailable(&owner), 2);
    assert_eq!(pair.alpha().next_remote_agent(&owner), Some(first.clone()));

    pair.alpha().abandon_potential_agents(&owner);
    pair.alpha().park_unavailable(&owner, first);
    assert_eq!(pair.alpha().retry_unavailable(&owner), 0);
    assert_eq!(pair.alpha().next_remote_agent(&owner), None);
}

#[tokio::test]
async fn name_filter_limits_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = FakeCoordinator::new();
    let network = LoopbackNetwork::new();
    let config = agent_config("alpha", dir.path()).allowed_remote_agent_names("gam*");
    let alpha = TestAgent::start(config, &coordinator, &network).unwrap();
    for name in ["beta", "gamma", "gamma2"] {
        let mut info = agent_info(name);
        info.group = "Default".to_string();
        coordinator.add_agent(info);
    }
    alpha.launcher.add_running(10, "tool");
    let reply = alpha.agent.manager().open_local(10, false).await.unwrap();
    let owner = alpha.agent.connections().get(reply.handle).unwrap();

    assert_eq!(alpha.agent.manager().reset_potential_agents(&owner).await, 2);
}

#[tokio::test]
async fn heartbeat_is_throttled_unless_forced() {
    let pair = Pair::new();
    let before = pair.coordinator.pings().len();
    pair.alpha().ping_coordinator(false).await;
    pair.alpha().ping_coordinator(false).await;
    assert_eq!(pair.coordinator.pings().len(), before + 1);

    pair.alpha().ping_coordinator(true).await;
    assert_eq!(pair.coordinator.pings().len(), before + 2);

    pair.alpha.clock.advance(PING_INTERVAL);
    pair.alpha().ping_coordinator(false).await;
    assert_eq!(pair.coordinator.pings().len(), before + 3);
}

#[tokio::test]
async fn restart_request_waits_for_an_idle_agent() {
    let pair = Pair::new();
    pair.coordinator.request_restart(true);
    pair.alpha().open_local(10, false).await.unwrap();
    assert!(!pair.alpha().restart_due());

    pair.alpha.agent.shutdown().await;
    pair.alpha().maintain_connections().await;
    assert!(pair.alpha().restart_due());
}

#[tokio::test]
async fn owner_process_exit_shuts_the_agent_down() {
    let pair = Pair::new();
    pair.alpha.launcher.add_running(10, "host");
    pair.alpha().open_local(10, true).await.unwrap();
    pair.alpha.launcher.remove_running(10);

    pair.alpha().maintain_connections().await;
    assert!(pair.alpha.agent.shutdown_token().is_cancelled());
}

#[tokio::test]
async fn shutting_down_refuses_new_clients() {
    let pair = Pair::new();
    pair.alpha.agent.shutdown().await;
    let result = pair.alpha().open_local(10, false).await;
    assert!(matches!(result, Err(AgentError::InvalidArgument(_))));
    assert_eq!(pair.alpha().state(), AgentState::Closed);
}
