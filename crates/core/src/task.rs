// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and task state machines

use serde::{Deserialize, Serialize};

/// Job lifecycle: Unspecified -> Pending -> Running -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Unspecified,
    Pending,
    Running,
    Closed,
}

/// Set exactly once, away from `Incomplete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessState {
    #[default]
    Incomplete,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Accepted,
    Rejected,
    Running,
    Success,
    Failure,
    Killed,
}

impl TaskState {
    /// The task went back to its job without finishing
    pub fn is_requeue(self) -> bool {
        matches!(self, TaskState::Rejected | TaskState::Killed)
    }

    pub fn is_complete(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

crate::simple_display! {
    JobState {
        Unspecified => "unspecified",
        Pending => "pending",
        Running => "running",
        Closed => "closed",
    }
}

crate::simple_display! {
    SuccessState {
        Incomplete => "incomplete",
        Success => "success",
        Failure => "failure",
    }
}

crate::simple_display! {
    TaskState {
        Idle => "idle",
        Accepted => "accepted",
        Rejected => "rejected",
        Running => "running",
        Success => "success",
        Failure => "failure",
        Killed => "killed",
    }
}
