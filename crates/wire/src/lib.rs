// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol for talking to a swarm agent.
//!
//! Three surfaces share one framing:
//! - [`Request`]/[`Response`]: local clients over the agent's Unix socket
//! - [`PeerRequest`]/[`PeerResponse`]: agent-to-agent calls over TCP
//! - [`CoordinatorRequest`]/[`CoordinatorResponse`]: the coordinator directory
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bytes;
mod coordinator;
mod peer;
mod request;
mod response;
mod status;
mod wire;

pub use coordinator::{CoordinatorRequest, CoordinatorResponse};
pub use peer::{PeerEnvelope, PeerRequest, PeerResponse};
pub use request::{CacheMaintenance, Request};
pub use response::{OpenConnectionReply, Response};
pub use status::{CacheSummary, ConnectionEntry, ConnectionKind, JobEntry, StatusSummary};
pub use wire::{decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError};
pub use wire::{read_request, write_response};

/// Protocol version exchanged in `Hello`
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod property_tests;
