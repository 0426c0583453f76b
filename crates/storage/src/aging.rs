// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache aging: which job folders, logs and channels to delete.
//!
//! Planning is a pure function over a directory scan so the policy can be
//! tested without a filesystem. The sweep applies a plan, checking the
//! cancellation token between deletions.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheError, ChannelCache};
use crate::layout::DEBUG_JOB_GUID;

/// Log files kept by aging, newest first
pub const RETAINED_LOG_FILES: usize = 10;

/// One persistent channel on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub accessed: SystemTime,
}

/// A job folder or log file with its modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedPath {
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgingPlan {
    pub job_folders: Vec<PathBuf>,
    pub log_files: Vec<PathBuf>,
    /// Oldest access first
    pub channels: Vec<CachedFile>,
}

impl AgingPlan {
    pub fn is_empty(&self) -> bool {
        self.job_folders.is_empty() && self.log_files.is_empty() && self.channels.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgingReport {
    pub job_folders_removed: usize,
    pub log_files_removed: usize,
    pub channels_removed: usize,
    pub bytes_freed: u64,
    pub cancelled: bool,
}

/// Decide what aging deletes.
///
/// Job folders are kept newest-first up to `retain_jobs`; `keep` is never
/// deleted and does not count against the limit. Channels are evicted
/// least-recently-accessed first (ties by name) until the remaining total
/// fits `quota_bytes`. Job folders do not count toward the quota.
pub fn plan_aging(
    files: &[CachedFile],
    job_folders: &[DatedPath],
    logs: &[DatedPath],
    quota_bytes: u64,
    retain_jobs: usize,
    keep: &Path,
) -> AgingPlan {
    let job_folders = newest_beyond(
        job_folders.iter().filter(|f| f.path != keep).cloned().collect(),
        retain_jobs,
    );
    let log_files = newest_beyond(logs.to_vec(), RETAINED_LOG_FILES);

    let mut by_age: Vec<&CachedFile> = files.iter().collect();
    by_age.sort_by(|a, b| a.accessed.cmp(&b.accessed).then_with(|| a.name.cmp(&b.name)));
    let mut remaining: u64 = files.iter().map(|f| f.size).sum();
    let mut channels = Vec::new();
    for file in by_age {
        if remaining <= quota_bytes {
            break;
        }
        remaining = remaining.saturating_sub(file.size);
        channels.push(file.clone());
    }

    AgingPlan { job_folders, log_files, channels }
}

/// Everything past the `retain` newest entries
fn newest_beyond(mut entries: Vec<DatedPath>, retain: usize) -> Vec<PathBuf> {
    entries.sort_by(|a, b| {
        Reverse(a.modified).cmp(&Reverse(b.modified)).then_with(|| a.path.cmp(&b.path))
    });
    entries.into_iter().skip(retain).map(|e| e.path).collect()
}

impl ChannelCache {
    /// Scan the cache and plan an aging pass
    pub fn plan_aging(
        &self,
        quota_bytes: u64,
        retain_jobs: usize,
    ) -> Result<AgingPlan, CacheError> {
        let keep = self.job_dir(DEBUG_JOB_GUID);
        Ok(plan_aging(
            &self.persistent_files()?,
            &self.job_folders()?,
            &self.log_files()?,
            quota_bytes,
            retain_jobs,
            &keep,
        ))
    }

    /// Apply an aging plan, stopping early once `cancel` fires
    pub fn sweep(&self, plan: &AgingPlan, cancel: &CancellationToken) -> AgingReport {
        let mut report = AgingReport::default();

        for dir in &plan.job_folders {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            match std::fs::remove_dir_all(dir) {
                Ok(()) => report.job_folders_removed += 1,
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove job folder"),
            }
        }

        for log in &plan.log_files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            if std::fs::remove_file(log).is_ok() {
                report.log_files_removed += 1;
            }
        }

        for file in &plan.channels {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            self.forget(&file.name);
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    report.channels_removed += 1;
                    report.bytes_freed += file.size;
                }
                Err(e) => warn!(channel = %file.name, error = %e, "failed to evict channel"),
            }
        }

        info!(
            job_folders = report.job_folders_removed,
            channels = report.channels_removed,
            bytes = report.bytes_freed,
            "cache aging finished"
        );
        report
    }
}

#[cfg(test)]
#[path = "aging_tests.rs"]
mod tests;
