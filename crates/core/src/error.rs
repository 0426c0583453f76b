// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy carried across the operation boundary.
//!
//! Failures inside a single operation are converted to the nearest variant
//! and reported to the caller as a negative result code; they never unwind
//! across a connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum AgentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection not found")]
    ConnectionNotFound,

    #[error("connection disconnected")]
    ConnectionDisconnected,

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The file exists but is mid-transfer
    #[error("channel not ready: {0}")]
    ChannelNotReady(String),

    #[error("channel I/O failed: {0}")]
    ChannelIoFailed(String),

    #[error("job error: {0}")]
    JobError(String),

    #[error("job not found")]
    JobNotFound,

    #[error("internal exception: {0}")]
    InternalException(String),
}

impl AgentError {
    /// Negative result code reported to clients
    pub fn code(&self) -> i32 {
        match self {
            AgentError::InvalidArgument(_) => -1,
            AgentError::ConnectionNotFound => -2,
            AgentError::ConnectionDisconnected => -3,
            AgentError::ChannelNotFound(_) => -4,
            AgentError::ChannelNotReady(_) => -5,
            AgentError::ChannelIoFailed(_) => -6,
            AgentError::JobError(_) => -7,
            AgentError::JobNotFound => -8,
            AgentError::InternalException(_) => -9,
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        AgentError::InternalException(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
