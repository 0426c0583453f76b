// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Swarm agent daemon library
//!
//! `swarmd` wires the engine to real sockets: a Unix socket for local
//! clients, a TCP port for peer agents, and the maintenance tick.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod logging;

pub use lifecycle::{startup, Config, DaemonState, LifecycleError, StartupResult};
