// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use tempfile::TempDir;

/// State dir with a standalone agent configuration
fn standalone_dir(cache_root: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());
    std::fs::write(
        &config.config_path,
        format!("agent_name = \"solo\"\nstandalone = true\ncache_root = \"{cache_root}\"\n"),
    )
    .unwrap();
    (dir, config)
}

#[tokio::test]
#[serial]
async fn startup_creates_daemon_files() {
    let (dir, config) = standalone_dir("cache");

    let result = startup(&config).await.unwrap();

    assert!(config.socket_path.exists());
    assert!(config.version_path.exists());
    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    assert!(dir.path().join("cache").join("Logs").is_dir());
    assert!(result.peers.is_none());
    assert_eq!(result.daemon.agent.name(), "solo");
}

#[tokio::test]
#[serial]
async fn second_startup_fails_on_the_lock_and_leaves_files_alone() {
    let (_dir, config) = standalone_dir("cache");
    let _first = startup(&config).await.unwrap();

    let err = startup(&config).await.err().unwrap();
    assert!(matches!(err, LifecycleError::LockFailed(_)), "{err}");
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
}

#[tokio::test]
#[serial]
async fn shutdown_removes_daemon_files() {
    let (_dir, config) = standalone_dir("cache");
    let mut result = startup(&config).await.unwrap();

    result.daemon.shutdown().await.unwrap();

    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
    assert!(!config.version_path.exists());
    assert!(result.daemon.agent.shutdown_token().is_cancelled());
}

#[tokio::test]
#[serial]
async fn unusable_cache_root_is_fatal_and_cleaned_up() {
    let (dir, config) = standalone_dir("blocker/cache");
    std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();

    let err = startup(&config).await.err().unwrap();

    assert!(matches!(err, LifecycleError::CacheRoot(..)), "{err}");
    assert!(!config.lock_path.exists());
    assert!(!config.socket_path.exists());
}

#[tokio::test]
#[serial]
async fn peer_port_zero_advertises_the_bound_port() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());
    std::fs::write(&config.config_path, "agent_name = \"open\"\npeer_port = 0\n").unwrap();

    let result = startup(&config).await.unwrap();

    let bound = result.peers.as_ref().unwrap().local_addr().unwrap().port();
    assert_ne!(bound, 0);
    assert_eq!(result.daemon.agent.config().peer_port, bound);
}
