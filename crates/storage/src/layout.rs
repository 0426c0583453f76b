// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory layout under the cache root

use std::path::{Component, Path, PathBuf};
use swarm_core::JobGuid;

/// Job folder left alone by aging and process clean-up so it can be debugged in place
pub const DEBUG_JOB_GUID: JobGuid = JobGuid::from_u128(0x0000_0123_0000_4567_0000_89ab_0000_cdef);

const STAGING_DIR: &str = "AgentStagingArea";
const JOBS_DIR: &str = "Jobs";
const LOGS_DIR: &str = "Logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn job_dir(&self, job: JobGuid) -> PathBuf {
        self.jobs_dir().join(format!("Job-{job}"))
    }

    /// Path of a persistent channel
    pub fn channel_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of a job-scoped channel
    pub fn job_channel_path(&self, job: JobGuid, name: &str) -> PathBuf {
        self.job_dir(job).join(name)
    }

    /// Unique staging file for one write-mode channel
    pub fn staging_path(&self, tag: &str, name: &str) -> PathBuf {
        let flat: String =
            name.chars().map(|c| if matches!(c, '/' | '\\') { '_' } else { c }).collect();
        self.staging_dir().join(format!("{tag}-{flat}"))
    }

    /// True for top-level entries that are not channels
    pub fn is_reserved_dir(name: &str) -> bool {
        matches!(name, STAGING_DIR | JOBS_DIR | LOGS_DIR)
    }
}

/// Channel names are relative paths without parent or root components
pub fn is_valid_channel_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
        && path
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .is_some_and(|first| !CacheLayout::is_reserved_dir(first))
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
