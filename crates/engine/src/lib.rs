// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-engine: the agent's services.
//!
//! - [`ConnectionManager`]: admits local clients and remote workers
//! - [`ChannelService`]: the file cache as seen by connections
//! - [`Scheduler`]: jobs, tasks and the job executable
//! - [`Router`]: the message queue between connections
//!
//! [`Agent`] wires them together and dispatches client and peer requests.

pub mod agent;
pub mod channels;
pub mod connection;
pub mod job;
pub mod manager;
pub mod replay;
pub mod router;
pub mod scheduler;
pub mod striping;

#[cfg(any(test, feature = "test-support"))]
pub mod loopback;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::Arc;
use swarm_core::AgentConfig;

/// Configuration shared by every service, replaced only by a reload
pub type SharedConfig = Arc<parking_lot::RwLock<AgentConfig>>;

pub use agent::{Agent, AgentDeps, TickReport};
pub use channels::{AgingLimits, ChannelService};
pub use connection::{Connection, ConnectionState, ConnectionTable};
pub use job::{AgentJob, JobTable};
pub use manager::ConnectionManager;
pub use replay::{AgentJobRecord, ReplayMismatch, ReplayPlan};
pub use router::Router;
pub use scheduler::Scheduler;

#[cfg(any(test, feature = "test-support"))]
pub use loopback::LoopbackNetwork;
