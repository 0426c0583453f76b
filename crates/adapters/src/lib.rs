// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the agent's external collaborators: the coordinator
//! directory, peer agents, the telemetry sink and the job process launcher.

pub mod coordinator;
pub mod launcher;
pub mod peer;
pub mod telemetry;

pub use coordinator::{Coordinator, CoordinatorError, NoCoordinator, TcpCoordinator};
pub use launcher::{split_arguments, LaunchError, LaunchSpec, ProcessLauncher, RunningProcess};
pub use launcher::{TokioLauncher, NO_EXIT_CODE};
pub use peer::{AgentPeer, PeerConnector, PeerError, TcpConnector, TcpPeer};
pub use telemetry::{LogColour, MachineState, TelemetrySink, TracingTelemetry, Verbosity};

#[cfg(any(test, feature = "test-support"))]
pub use coordinator::FakeCoordinator;
#[cfg(any(test, feature = "test-support"))]
pub use launcher::{FakeLauncher, FakeProcess, KILLED_EXIT_CODE};
#[cfg(any(test, feature = "test-support"))]
pub use telemetry::{RecordingTelemetry, TelemetryEvent};
