// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use swarm_adapters::FakeCoordinator;
use swarm_engine::test_support::{agent_config, TestAgent};
use swarm_engine::LoopbackNetwork;

const WAIT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(10);

fn start(coordinator: &FakeCoordinator, cache: &std::path::Path) -> TestAgent {
    TestAgent::start(agent_config("alpha", cache), coordinator, &LoopbackNetwork::new()).unwrap()
}

#[tokio::test]
async fn maintenance_stops_with_the_agent() {
    let dir = tempfile::tempdir().unwrap();
    let test = start(&FakeCoordinator::new(), dir.path());
    let loop_task = tokio::spawn(run_maintenance(test.agent.clone(), TICK));

    test.agent.shutdown().await;
    let exit = tokio::time::timeout(WAIT, loop_task).await.unwrap().unwrap();
    assert_eq!(exit, MaintenanceExit::Shutdown);
}

#[tokio::test]
async fn coordinator_restart_ends_maintenance_when_idle() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = FakeCoordinator::new();
    coordinator.request_restart(true);
    let test = start(&coordinator, dir.path());

    let exit = tokio::time::timeout(WAIT, run_maintenance(test.agent.clone(), TICK)).await.unwrap();
    assert_eq!(exit, MaintenanceExit::Restart);
}

#[tokio::test]
async fn restart_waits_for_open_connections() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = FakeCoordinator::new();
    coordinator.request_restart(true);
    let test = start(&coordinator, dir.path());
    test.launcher.add_running(10, "tool");
    test.agent.manager().open_local(10, false).await.unwrap();

    let pending = tokio::time::timeout(
        Duration::from_millis(200),
        run_maintenance(test.agent.clone(), TICK),
    )
    .await;
    assert!(pending.is_err(), "restarted with a client attached");
}

#[tokio::test]
async fn going_idle_rolls_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("Logs");
    let test = start(&FakeCoordinator::new(), &dir.path().join("cache"));
    let log = RollingLog::open(&logs).unwrap();
    let first = log.path();
    spawn_log_roller(&test.agent, log.clone());

    test.launcher.add_running(10, "tool");
    let handle = test.agent.manager().open_local(10, false).await.unwrap().handle;
    test.agent.tick().await;
    test.agent.manager().close(handle).await.unwrap();
    test.agent.tick().await;

    tokio::time::timeout(WAIT, async {
        while log.path() == first {
            tokio::time::sleep(TICK).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(std::fs::read_dir(&logs).unwrap().count(), 2);
}
