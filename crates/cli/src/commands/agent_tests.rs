// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn startup_error_prefers_the_last_swarmd_line() {
    let stderr = "warning: something\nswarmd: Failed to acquire lock: daemon already running?\n";
    assert_eq!(startup_error(stderr), "Failed to acquire lock: daemon already running?");
}

#[test]
fn startup_error_falls_back_to_the_whole_output() {
    assert_eq!(startup_error("  killed by signal\n"), "killed by signal");
}

#[test]
#[serial]
fn binary_override_wins() {
    std::env::set_var("SWARMD_BIN", "/opt/swarm/bin/swarmd");
    assert_eq!(find_swarmd_binary(), PathBuf::from("/opt/swarm/bin/swarmd"));
    std::env::remove_var("SWARMD_BIN");
}

#[test]
fn not_running_maps_to_its_exit_code() {
    let err = not_running_or(ClientError::NotRunning);
    let exit = err.downcast_ref::<ExitError>().unwrap();
    assert_eq!(exit.code, crate::exit_error::NOT_RUNNING);

    let err = not_running_or(ClientError::Unexpected("Pong".to_string()));
    assert!(err.downcast_ref::<ExitError>().is_none());
}
