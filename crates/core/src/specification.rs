// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and task specifications as submitted by an instigator

use crate::id::TaskGuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobFlags(pub u32);

impl JobFlags {
    pub const NONE: Self = Self(0);
    /// Other agents may be recruited to work on the job
    pub const ALLOW_REMOTE: Self = Self(1 << 0);
    /// The executable is started by the user, not the agent
    pub const MANUAL_START: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for JobFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobSpecification {
    /// Cache channel name of the executable
    pub executable: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub flags: JobFlags,
    #[serde(default)]
    pub required_dependencies: Vec<String>,
    #[serde(default)]
    pub optional_dependencies: Vec<String>,
    /// Cache channel name -> file name the executable expects in its working directory
    #[serde(default)]
    pub original_names: BTreeMap<String, String>,
}

impl JobSpecification {
    /// Name the executable or dependency should have inside the job directory
    pub fn original_name<'a>(&'a self, channel: &'a str) -> &'a str {
        self.original_names.get(channel).map(String::as_str).unwrap_or(channel)
    }

    /// Executable plus every declared dependency, required ones flagged
    pub fn all_channels(&self) -> impl Iterator<Item = (&str, bool)> {
        std::iter::once((self.executable.as_str(), true))
            .chain(self.required_dependencies.iter().map(|d| (d.as_str(), true)))
            .chain(self.optional_dependencies.iter().map(|d| (d.as_str(), false)))
    }
}

/// 32- and 64-bit variants of one job. The agent runs the 64-bit one when present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobSpecifications {
    #[serde(default)]
    pub spec32: Option<JobSpecification>,
    #[serde(default)]
    pub spec64: Option<JobSpecification>,
}

impl JobSpecifications {
    pub fn single(spec: JobSpecification) -> Self {
        Self { spec32: None, spec64: Some(spec) }
    }

    /// The variant this agent will execute
    pub fn effective(&self) -> Option<&JobSpecification> {
        self.spec64.as_ref().or(self.spec32.as_ref())
    }

    /// Every variant present; instigators stage files for both
    pub fn variants(&self) -> impl Iterator<Item = &JobSpecification> {
        self.spec32.iter().chain(self.spec64.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpecification {
    pub guid: TaskGuid,
    #[serde(default)]
    pub parameters: String,
    /// Relative cost used to order work; higher runs first
    #[serde(default)]
    pub cost: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskSpecification {
    pub fn new(parameters: impl Into<String>, cost: u32) -> Self {
        Self {
            guid: TaskGuid::new(),
            parameters: parameters.into(),
            cost,
            dependencies: Vec::new(),
        }
    }
}

crate::builder! {
    pub struct JobSpecificationBuilder => JobSpecification {
        into {
            executable: String = "worker.bin",
            parameters: String = "",
        }
        set {
            flags: JobFlags = JobFlags::NONE,
            required_dependencies: Vec<String> = Vec::new(),
            optional_dependencies: Vec<String> = Vec::new(),
            original_names: BTreeMap<String, String> = BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "specification_tests.rs"]
mod tests;
