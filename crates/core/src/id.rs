// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handles and job/task guids

use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Identifies a connection.
///
/// Handles are shared by both ends of a remote connection: the caller
/// allocates it and the callee registers its side under the same value.
/// Valid handles are non-negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Handle(pub i32);

impl Handle {
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

crate::define_guid! {
    /// Identifies a job on every agent that works on it.
    pub struct JobGuid;
}

crate::define_guid! {
    /// Identifies a task within its job.
    pub struct TaskGuid;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
