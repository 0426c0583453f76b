// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-core: shared types for the swarm compute-distribution agent

pub mod macros;

pub mod agent_info;
pub mod channel;
pub mod clock;
pub mod collections;
pub mod config;
pub mod error;
pub mod id;
pub mod message;
pub mod specification;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent_info::{AgentInfo, AgentState};
pub use channel::{ChannelAccess, ChannelFlags, ChannelKind};
pub use clock::{Clock, FakeClock, SystemClock};
pub use collections::{RwMap, RwQueue, RwStack};
pub use config::{name_passes_filter, AgentConfig, ConfigError};
pub use error::{AgentError, AgentResult};
pub use id::{short, Handle, JobGuid, TaskGuid};
pub use message::{AlertLevel, DefaultRoute, JobReport, Message, MessageBody, MessageType};
pub use message::TaskResponse;
pub use specification::{JobFlags, JobSpecification, JobSpecifications, TaskSpecification};
pub use task::{JobState, SuccessState, TaskState};
