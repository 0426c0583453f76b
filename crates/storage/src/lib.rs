// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-storage: the on-disk channel cache.
//!
//! ```text
//! <cache>/<channel files, named + SHA-1 indexed>
//! <cache>/AgentStagingArea/<in-progress write channels>
//! <cache>/Jobs/Job-<guid>/<job-scoped channels & copied dependencies>
//! <cache>/Logs/<per-run log files>
//! ```

mod aging;
mod cache;
mod hash;
mod layout;

pub use aging::{plan_aging, AgingPlan, AgingReport, CachedFile, DatedPath, RETAINED_LOG_FILES};
pub use cache::{CacheError, CacheStats, ChannelCache};
pub use hash::{hash_bytes, hash_file, HashIndex};
pub use layout::{CacheLayout, DEBUG_JOB_GUID};
