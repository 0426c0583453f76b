// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent channel store plus per-job scratch folders

use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use swarm_core::{AgentError, JobGuid, RwMap};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hash::{hash_file, HashIndex};
use crate::layout::{is_valid_channel_name, CacheLayout};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache root {0} is unusable: {1}")]
    Root(PathBuf, #[source] std::io::Error),

    #[error("invalid channel name: {0:?}")]
    InvalidName(String),

    #[error("channel not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CacheError> for AgentError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InvalidName(name) => {
                AgentError::InvalidArgument(format!("invalid channel name: {name:?}"))
            }
            CacheError::NotFound(name) => AgentError::ChannelNotFound(name),
            other => AgentError::ChannelIoFailed(other.to_string()),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io { path: path.to_path_buf(), source }
}

/// Counts reported in agent status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub channels: usize,
    pub bytes: u64,
    pub job_folders: usize,
    pub hashes: usize,
}

pub struct ChannelCache {
    layout: RwLock<CacheLayout>,
    hashes: HashIndex,
    /// Names currently being received from a peer
    in_flight: RwMap<String, ()>,
    /// Last time a channel was opened, newer than filesystem atime
    accessed: RwMap<String, SystemTime>,
}

impl ChannelCache {
    /// Create (or reuse) the cache root and its fixed subdirectories.
    ///
    /// Leftover staging files from a previous run are discarded.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let layout = CacheLayout::new(root);
        init_layout(&layout)?;
        info!(root = %layout.root().display(), "channel cache ready");
        Ok(Self {
            layout: RwLock::new(layout),
            hashes: HashIndex::default(),
            in_flight: RwMap::new(),
            accessed: RwMap::new(),
        })
    }

    /// Re-run initialisation against a new root. The hash index starts empty.
    pub fn relocate(&self, root: impl Into<PathBuf>) -> Result<(), CacheError> {
        let layout = CacheLayout::new(root);
        init_layout(&layout)?;
        info!(root = %layout.root().display(), "channel cache relocated");
        *self.layout.write() = layout;
        self.hashes.clear();
        self.accessed.clear();
        Ok(())
    }

    pub fn layout(&self) -> CacheLayout {
        self.layout.read().clone()
    }

    pub fn root(&self) -> PathBuf {
        self.layout.read().root().to_path_buf()
    }

    pub fn check_name(name: &str) -> Result<(), CacheError> {
        if is_valid_channel_name(name) {
            Ok(())
        } else {
            Err(CacheError::InvalidName(name.to_string()))
        }
    }

    pub fn channel_path(&self, name: &str) -> Result<PathBuf, CacheError> {
        Self::check_name(name)?;
        Ok(self.layout.read().channel_path(name))
    }

    pub fn job_channel_path(&self, job: JobGuid, name: &str) -> Result<PathBuf, CacheError> {
        Self::check_name(name)?;
        Ok(self.layout.read().job_channel_path(job, name))
    }

    /// True when a persistent channel exists and is not mid-transfer
    pub fn contains(&self, name: &str) -> bool {
        self.channel_path(name).map(|p| p.is_file()).unwrap_or(false) && !self.is_in_flight(name)
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains_key(&name.to_string())
    }

    /// Record a read access for aging
    pub fn touch(&self, name: &str) {
        self.accessed.insert(name.to_string(), SystemTime::now());
    }

    /// Copy an external file into the persistent cache
    pub fn add_channel(&self, source: &Path, name: &str) -> Result<String, CacheError> {
        let dest = self.channel_path(name)?;
        if !source.is_file() {
            return Err(CacheError::NotFound(source.display().to_string()));
        }
        let staged = self.layout.read().staging_path("add", name);
        std::fs::copy(source, &staged).map_err(io_err(&staged))?;
        self.commit_staged_to(&staged, &dest, name)
    }

    /// Digest of a persistent channel, computed on first use
    pub fn hash(&self, name: &str) -> Result<String, CacheError> {
        if let Some(hash) = self.hashes.get(name) {
            return Ok(hash);
        }
        let path = self.channel_path(name)?;
        let hash = hash_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::NotFound(name.to_string()),
            _ => CacheError::Io { path: path.clone(), source: e },
        })?;
        self.hashes.set(name, hash.clone());
        Ok(hash)
    }

    /// True iff the local copy exists and its digest equals `remote_hash`
    pub fn validate_channel(&self, name: &str, remote_hash: &str) -> bool {
        match self.hash(name) {
            Ok(local) => local.eq_ignore_ascii_case(remote_hash),
            Err(_) => false,
        }
    }

    pub fn read_channel(&self, name: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.channel_path(name)?;
        read_file(&path, name)
    }

    pub fn read_job_channel(&self, job: JobGuid, name: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.job_channel_path(job, name)?;
        read_file(&path, name)
    }

    /// Write received bytes into the persistent cache through the staging area
    pub fn store_channel(&self, name: &str, data: &[u8]) -> Result<String, CacheError> {
        let dest = self.channel_path(name)?;
        self.in_flight.insert(name.to_string(), ());
        let result = (|| {
            let staged = self.layout.read().staging_path("recv", name);
            std::fs::write(&staged, data).map_err(io_err(&staged))?;
            self.commit_staged_to(&staged, &dest, name)
        })();
        self.in_flight.remove(&name.to_string());
        result
    }

    /// Write received bytes into a job folder
    pub fn store_job_channel(
        &self,
        job: JobGuid,
        name: &str,
        data: &[u8],
    ) -> Result<(), CacheError> {
        let dest = self.job_channel_path(job, name)?;
        ensure_parent(&dest)?;
        let staged = self.layout.read().staging_path(&format!("job-{job}"), name);
        std::fs::write(&staged, data).map_err(io_err(&staged))?;
        std::fs::rename(&staged, &dest).map_err(io_err(&dest))
    }

    /// Move a finished write channel from staging into the persistent cache
    pub fn commit_staged(&self, staged: &Path, name: &str) -> Result<String, CacheError> {
        let dest = self.channel_path(name)?;
        self.commit_staged_to(staged, &dest, name)
    }

    /// Move a finished write channel from staging into its job folder
    pub fn commit_staged_job(
        &self,
        staged: &Path,
        job: JobGuid,
        name: &str,
    ) -> Result<(), CacheError> {
        let dest = self.job_channel_path(job, name)?;
        ensure_parent(&dest)?;
        std::fs::rename(staged, &dest).map_err(io_err(&dest))
    }

    fn commit_staged_to(
        &self,
        staged: &Path,
        dest: &Path,
        name: &str,
    ) -> Result<String, CacheError> {
        if !staged.is_file() {
            return Err(CacheError::NotFound(name.to_string()));
        }
        ensure_parent(dest)?;
        self.hashes.forget(name);
        std::fs::rename(staged, dest).map_err(io_err(dest))?;
        let hash = hash_file(dest).map_err(io_err(dest))?;
        self.hashes.set(name, hash.clone());
        self.touch(name);
        debug!(channel = name, hash = %hash, "channel committed");
        Ok(hash)
    }

    /// Drop a staging file that will never be committed
    pub fn discard_staged(&self, staged: &Path) {
        if let Err(e) = std::fs::remove_file(staged) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %staged.display(), error = %e, "failed to discard staged channel");
            }
        }
    }

    /// Staging path for a new write channel
    pub fn staging_path(&self, tag: &str, name: &str) -> Result<PathBuf, CacheError> {
        Self::check_name(name)?;
        Ok(self.layout.read().staging_path(tag, name))
    }

    /// Recreate `Jobs/Job-<guid>` empty
    pub fn create_job_dir(&self, job: JobGuid) -> Result<PathBuf, CacheError> {
        let dir = self.layout.read().job_dir(job);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(dir)
    }

    pub fn job_dir(&self, job: JobGuid) -> PathBuf {
        self.layout.read().job_dir(job)
    }

    /// Copy a persistent channel into a job folder under `original_name`
    pub fn copy_into_job(
        &self,
        job: JobGuid,
        name: &str,
        original_name: &str,
    ) -> Result<PathBuf, CacheError> {
        let source = self.channel_path(name)?;
        let dest = self.job_channel_path(job, original_name)?;
        ensure_parent(&dest)?;
        std::fs::copy(&source, &dest).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::NotFound(name.to_string()),
            _ => CacheError::Io { path: dest.clone(), source: e },
        })?;
        self.touch(name);
        Ok(dest)
    }

    /// Delete everything except the log folder
    pub fn clear(&self) -> Result<(), CacheError> {
        let layout = self.layout();
        let entries = std::fs::read_dir(layout.root()).map_err(io_err(layout.root()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == layout.logs_dir() {
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "failed to clear cache entry");
            }
        }
        init_layout(&layout)?;
        self.hashes.clear();
        self.accessed.clear();
        info!("channel cache cleared");
        Ok(())
    }

    /// Re-hash every persistent channel, replacing the index. Returns the channel count.
    pub fn validate_all(&self) -> Result<usize, CacheError> {
        let files = self.persistent_files()?;
        self.hashes.clear();
        for file in &files {
            match hash_file(&file.path) {
                Ok(hash) => self.hashes.set(&file.name, hash),
                Err(e) => warn!(channel = %file.name, error = %e, "failed to hash channel"),
            }
        }
        info!(channels = files.len(), "channel cache validated");
        Ok(files.len())
    }

    pub fn hash_snapshot(&self) -> Vec<(String, String)> {
        self.hashes.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        let files = self.persistent_files().unwrap_or_default();
        let job_folders = self.job_folders().map(|f| f.len()).unwrap_or(0);
        CacheStats {
            channels: files.len(),
            bytes: files.iter().map(|f| f.size).sum(),
            job_folders,
            hashes: self.hashes.len(),
        }
    }

    /// Every persistent channel on disk, with size and last access
    pub fn persistent_files(&self) -> Result<Vec<crate::CachedFile>, CacheError> {
        let root = self.root();
        let mut out = Vec::new();
        walk(&root, &root, &mut out)?;
        for file in &mut out {
            if let Some(t) = self.accessed.get(&file.name) {
                file.accessed = file.accessed.max(t);
            }
        }
        Ok(out)
    }

    /// Every job folder with its modification time
    pub fn job_folders(&self) -> Result<Vec<crate::DatedPath>, CacheError> {
        let jobs = self.layout.read().jobs_dir();
        dated_entries(&jobs, true)
    }

    /// Every log file with its modification time
    pub fn log_files(&self) -> Result<Vec<crate::DatedPath>, CacheError> {
        let logs = self.layout.read().logs_dir();
        dated_entries(&logs, false)
    }

    /// Forget index and access records for a deleted channel
    pub(crate) fn forget(&self, name: &str) {
        self.hashes.forget(name);
        self.accessed.remove(&name.to_string());
    }
}

fn init_layout(layout: &CacheLayout) -> Result<(), CacheError> {
    for dir in [layout.root().to_path_buf(), layout.jobs_dir(), layout.logs_dir()] {
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Root(dir.clone(), e))?;
    }
    let staging = layout.staging_dir();
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| CacheError::Root(staging.clone(), e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| CacheError::Root(staging.clone(), e))?;
    Ok(())
}

fn dated_entries(dir: &Path, dirs: bool) -> Result<Vec<crate::DatedPath>, CacheError> {
    let entries = std::fs::read_dir(dir).map_err(io_err(dir))?;
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() != dirs {
            continue;
        }
        let modified =
            entry.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
        out.push(crate::DatedPath { path, modified });
    }
    Ok(out)
}

fn ensure_parent(path: &Path) -> Result<(), CacheError> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent).map_err(io_err(parent)),
        None => Ok(()),
    }
}

fn read_file(path: &Path, name: &str) -> Result<Vec<u8>, CacheError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CacheError::NotFound(name.to_string()),
        _ => CacheError::Io { path: path.to_path_buf(), source: e },
    })
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<crate::CachedFile>) -> Result<(), CacheError> {
    let entries = std::fs::read_dir(dir).map_err(io_err(dir))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else { continue };
        let name = rel.to_string_lossy().replace('\\', "/");
        if dir == root && CacheLayout::is_reserved_dir(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            walk(root, &path, out)?;
        } else {
            let accessed = meta
                .accessed()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            out.push(crate::CachedFile { name, path, size: meta.len(), accessed });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
