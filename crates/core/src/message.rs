// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages exchanged through the agent's router

use crate::id::{Handle, JobGuid, TaskGuid};
use crate::specification::TaskSpecification;
use crate::task::TaskState;
use serde::{Deserialize, Serialize};

/// A routed message. `from`/`to` are filled in by the router when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<Handle>,
    #[serde(default)]
    pub to: Option<Handle>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Self { from: None, to: None, body }
    }

    pub fn routed(from: Handle, to: Handle, body: MessageBody) -> Self {
        Self { from: Some(from), to: Some(to), body }
    }

    pub fn kind(&self) -> MessageType {
        self.body.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Quit,
    Ping,
    Signal,
    Info {
        text: String,
    },
    Alert {
        job: JobGuid,
        level: AlertLevel,
        #[serde(default)]
        object: Option<String>,
        #[serde(default)]
        type_id: i32,
        text: String,
    },
    Timing {
        state: i32,
        thread: i32,
    },
    TaskRequest,
    TaskRequestResponse {
        response: TaskResponse,
    },
    TaskState {
        task: TaskGuid,
        state: TaskState,
        #[serde(default)]
        exit_code: i32,
        #[serde(default)]
        running_time: f32,
        #[serde(default)]
        text: Option<String>,
    },
    JobState {
        job: JobGuid,
        state: JobReport,
        #[serde(default)]
        exit_code: i32,
        #[serde(default)]
        running_time: f32,
        #[serde(default)]
        text: Option<String>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageType {
        match self {
            MessageBody::Quit => MessageType::Quit,
            MessageBody::Ping => MessageType::Ping,
            MessageBody::Signal => MessageType::Signal,
            MessageBody::Info { .. } => MessageType::Info,
            MessageBody::Alert { .. } => MessageType::Alert,
            MessageBody::Timing { .. } => MessageType::Timing,
            MessageBody::TaskRequest => MessageType::TaskRequest,
            MessageBody::TaskRequestResponse { .. } => MessageType::TaskRequestResponse,
            MessageBody::TaskState { .. } => MessageType::TaskState,
            MessageBody::JobState { .. } => MessageType::JobState,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        MessageBody::Info { text: text.into() }
    }

    pub fn task_state(task: TaskGuid, state: TaskState) -> Self {
        MessageBody::TaskState { task, state, exit_code: 0, running_time: 0.0, text: None }
    }
}

/// Answer to a TASK_REQUEST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResponse {
    /// No more work; the worker may exit
    Release { job: JobGuid },
    /// No work right now; a task will be pushed when one appears
    Reservation { job: JobGuid },
    Specification { job: JobGuid, task: TaskSpecification },
}

/// Job progress reported to the instigator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReport {
    Running,
    Success,
    Failure,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    CriticalError,
}

/// Discriminant used by the routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Quit,
    Ping,
    Signal,
    Info,
    Alert,
    Timing,
    TaskRequest,
    TaskRequestResponse,
    TaskState,
    JobState,
}

/// Default destination when a client leaves `to` empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRoute {
    /// Straight back to the sender
    Sender,
    /// The sender's connected parent, else the sender
    Parent,
}

impl MessageType {
    /// Routing default for messages sent by clients, `None` when clients may not send it
    pub fn default_route(self) -> Option<DefaultRoute> {
        match self {
            MessageType::Quit | MessageType::Ping | MessageType::Signal => {
                Some(DefaultRoute::Sender)
            }
            MessageType::Info
            | MessageType::Alert
            | MessageType::Timing
            | MessageType::TaskRequest
            | MessageType::TaskState
            | MessageType::JobState => Some(DefaultRoute::Parent),
            MessageType::TaskRequestResponse => None,
        }
    }
}

crate::simple_display! {
    MessageType {
        Quit => "QUIT",
        Ping => "PING",
        Signal => "SIGNAL",
        Info => "INFO",
        Alert => "ALERT",
        Timing => "TIMING",
        TaskRequest => "TASK_REQUEST",
        TaskRequestResponse => "TASK_REQUEST_RESPONSE",
        TaskState => "TASK_STATE",
        JobState => "JOB_STATE",
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
