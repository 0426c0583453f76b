// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel open flags

use serde::{Deserialize, Serialize};

/// Where a channel lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Shared cache root, indexed by SHA-1
    Persistent,
    /// Scratch directory of one job
    JobOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelAccess {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelFlags {
    pub kind: ChannelKind,
    pub access: ChannelAccess,
}

impl ChannelFlags {
    pub const PERSISTENT_READ: Self =
        Self { kind: ChannelKind::Persistent, access: ChannelAccess::Read };
    pub const PERSISTENT_WRITE: Self =
        Self { kind: ChannelKind::Persistent, access: ChannelAccess::Write };
    pub const JOB_READ: Self = Self { kind: ChannelKind::JobOnly, access: ChannelAccess::Read };
    pub const JOB_WRITE: Self = Self { kind: ChannelKind::JobOnly, access: ChannelAccess::Write };

    pub fn is_write(self) -> bool {
        self.access == ChannelAccess::Write
    }

    pub fn is_job_only(self) -> bool {
        self.kind == ChannelKind::JobOnly
    }
}

crate::simple_display! {
    ChannelKind {
        Persistent => "persistent",
        JobOnly => "job",
    }
}
