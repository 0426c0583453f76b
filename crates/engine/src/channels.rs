// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel service: client channel operations over the on-disk cache,
//! plus pull/push replication with the upstream agent.
//!
//! A connection's upstream is itself when it is Remote, otherwise its
//! parent when that parent is Remote. Reads that miss locally pull from
//! the upstream; finished writes are pushed to it.

use crate::connection::{Connection, ConnectionTable, OpenChannel};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{AgentError, AgentResult, ChannelFlags, Handle, JobGuid};
use swarm_storage::{AgingReport, CacheStats, ChannelCache};
use swarm_wire::{CacheMaintenance, CacheSummary};
use tokio_util::sync::CancellationToken;

/// Attempts to pull a missing channel before giving up
pub const PULL_ATTEMPTS: u32 = 5;

const PULL_BACKOFF: Duration = Duration::from_millis(200);

/// How long a sweep may keep running once a client is waiting
const AGING_GRACE: Duration = Duration::from_millis(100);

/// Aging limits, taken from the agent config at call time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgingLimits {
    pub quota_bytes: u64,
    pub retained_job_folders: usize,
}

pub struct ChannelService {
    cache: Arc<ChannelCache>,
    connections: Arc<ConnectionTable>,
    /// Cancelled when a local client wants in during an aging sweep
    aging: parking_lot::Mutex<CancellationToken>,
    /// Local clients between asking to connect and being admitted
    clients_waiting: AtomicUsize,
}

/// Marks a local client as waiting for admission until dropped
pub struct ClientWaiting<'a> {
    service: &'a ChannelService,
}

impl Drop for ClientWaiting<'_> {
    fn drop(&mut self) {
        self.service.clients_waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChannelService {
    pub fn new(cache: Arc<ChannelCache>, connections: Arc<ConnectionTable>) -> Self {
        Self {
            cache,
            connections,
            aging: parking_lot::Mutex::new(CancellationToken::new()),
            clients_waiting: AtomicUsize::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<ChannelCache> {
        &self.cache
    }

    /// Copy a client's file into the persistent cache
    pub fn add_channel(&self, handle: Handle, full_path: &Path, name: &str) -> AgentResult<()> {
        self.connections.require(handle)?;
        let hash = self.cache.add_channel(full_path, name)?;
        tracing::debug!(handle = %handle, channel = name, %hash, "channel added");
        Ok(())
    }

    pub fn test_channel(&self, handle: Handle, name: &str) -> AgentResult<bool> {
        let conn = self.connections.require(handle)?;
        ChannelCache::check_name(name)?;
        let present = self.cache.contains(name);
        record_lookup(&conn, present);
        Ok(present)
    }

    /// Open a channel and return its id and the path the client uses
    pub async fn open_channel(
        &self,
        handle: Handle,
        name: &str,
        flags: ChannelFlags,
    ) -> AgentResult<(i32, PathBuf)> {
        let conn = self.connections.require(handle)?;
        ChannelCache::check_name(name)?;
        let job = if flags.is_job_only() {
            Some(conn.job().ok_or(AgentError::JobNotFound)?)
        } else {
            None
        };

        let path = match (job, flags.is_write()) {
            (None, false) => self.open_persistent_read(&conn, name).await?,
            (Some(job), false) => self.open_job_read(&conn, job, name).await?,
            (_, true) => {
                let id = conn.lock().next_channel;
                let tag = format!("{}-{}", handle.0, id);
                self.cache.staging_path(&tag, name)?
            }
        };

        let mut inner = conn.lock();
        let id = inner.next_channel;
        inner.next_channel += 1;
        inner.open_channels.insert(
            id,
            OpenChannel { name: name.to_string(), flags, path: path.clone(), job },
        );
        tracing::debug!(handle = %handle, channel = name, id, flags = ?flags, "channel opened");
        Ok((id, path))
    }

    /// Close a channel; write channels are committed and pushed upstream
    pub async fn close_channel(&self, handle: Handle, id: i32) -> AgentResult<()> {
        let conn = self.connections.require(handle)?;
        let channel = conn
            .lock()
            .open_channels
            .remove(&id)
            .ok_or_else(|| AgentError::InvalidArgument(format!("channel {id} is not open")))?;
        if !channel.flags.is_write() {
            return Ok(());
        }

        match channel.job {
            None => {
                let hash = self.cache.commit_staged(&channel.path, &channel.name)?;
                tracing::debug!(handle = %handle, channel = %channel.name, %hash, "written");
            }
            Some(job) => self.cache.commit_staged_job(&channel.path, job, &channel.name)?,
        }
        if let Some(upstream) = self.upstream(&conn) {
            self.push(&upstream, &channel.name, channel.job).await?;
        }
        Ok(())
    }

    /// Make a persistent channel available locally, pulling if needed.
    /// Used for job dependencies.
    pub async fn ensure_channel(&self, conn: &Arc<Connection>, name: &str) -> AgentResult<()> {
        self.open_persistent_read(conn, name).await.map(|_| ())
    }

    /// Drop staging files of write channels a connection never closed
    pub fn discard_open_channels(&self, conn: &Connection) {
        let open = std::mem::take(&mut conn.lock().open_channels);
        for channel in open.into_values().filter(|c| c.flags.is_write()) {
            tracing::debug!(handle = %conn.handle, channel = %channel.name, "discarding write");
            self.cache.discard_staged(&channel.path);
        }
    }

    /// Store a channel a peer pushed over connection `via`
    pub fn receive_channel(
        &self,
        via: Handle,
        name: &str,
        job: Option<JobGuid>,
        data: &[u8],
    ) -> AgentResult<()> {
        let conn = self.connections.require(via)?;
        match job {
            None => {
                self.cache.store_channel(name, data)?;
            }
            Some(job) => self.cache.store_job_channel(job, name, data)?,
        }
        conn.lock().stats.bytes_received += data.len() as u64;
        tracing::debug!(handle = %via, channel = name, bytes = data.len(), "channel received");
        Ok(())
    }

    /// A peer asked for a channel: push it back over the same connection
    pub async fn send_requested(
        &self,
        via: Handle,
        name: &str,
        job: Option<JobGuid>,
    ) -> AgentResult<()> {
        let conn = self.connections.require(via)?;
        if job.is_none() {
            self.cache.touch(name);
        }
        self.push(&conn, name, job).await
    }

    /// Compare our copy against a peer's digest
    pub fn validate_channel(&self, name: &str, hash: &str) -> bool {
        self.cache.validate_channel(name, hash)
    }

    /// Abort any aging sweep in progress, and keep new ones from starting
    /// until the returned guard is dropped
    pub fn client_waiting(&self) -> ClientWaiting<'_> {
        self.clients_waiting.fetch_add(1, Ordering::SeqCst);
        self.aging.lock().cancel();
        ClientWaiting { service: self }
    }

    /// Clear, re-validate or age the cache. Refused while connections exist.
    pub async fn maintain_cache(
        &self,
        mode: CacheMaintenance,
        limits: AgingLimits,
    ) -> AgentResult<Option<AgingReport>> {
        // Installed before the lock so a client arriving meanwhile can cancel it
        let token = CancellationToken::new();
        if mode == CacheMaintenance::Age {
            *self.aging.lock() = token.clone();
        }
        let _exclusive = self.connections.exclusive().await;
        if !self.connections.is_empty() {
            return Err(AgentError::InvalidArgument(
                "cache maintenance needs an agent with no connections".to_string(),
            ));
        }
        let cache = self.cache.clone();
        match mode {
            CacheMaintenance::Clear => {
                blocking(move || cache.clear()).await?;
                Ok(None)
            }
            CacheMaintenance::Validate => {
                let count = blocking(move || cache.validate_all()).await?;
                tracing::info!(channels = count, "cache validation requested");
                Ok(None)
            }
            CacheMaintenance::Age => {
                if token.is_cancelled() || self.clients_waiting.load(Ordering::SeqCst) > 0 {
                    return Ok(Some(AgingReport { cancelled: true, ..Default::default() }));
                }
                let sweep_token = token.clone();
                let mut sweep = tokio::task::spawn_blocking(move || {
                    let plan =
                        cache.plan_aging(limits.quota_bytes, limits.retained_job_folders)?;
                    Ok::<_, swarm_storage::CacheError>(cache.sweep(&plan, &sweep_token))
                });
                tokio::select! {
                    joined = &mut sweep => {
                        let report = joined
                            .map_err(|e| AgentError::internal(format!("aging task: {e}")))??;
                        Ok(Some(report))
                    }
                    _ = grace_after(&token) => {
                        tracing::warn!("cache aging did not yield in time, abandoning sweep");
                        Ok(Some(AgingReport { cancelled: true, ..Default::default() }))
                    }
                }
            }
        }
    }

    /// Point the cache at a new root; refused while connections exist
    pub async fn relocate(&self, root: PathBuf) -> AgentResult<()> {
        let _exclusive = self.connections.exclusive().await;
        if !self.connections.is_empty() {
            return Err(AgentError::InvalidArgument(
                "cannot relocate the cache while connections exist".to_string(),
            ));
        }
        let cache = self.cache.clone();
        blocking(move || cache.relocate(root)).await
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn summary(&self) -> CacheSummary {
        let stats = self.cache.stats();
        CacheSummary {
            root: self.cache.root().display().to_string(),
            channels: stats.channels,
            bytes: stats.bytes,
            job_folders: stats.job_folders,
            hashes: stats.hashes,
        }
    }

    fn upstream(&self, conn: &Arc<Connection>) -> Option<Arc<Connection>> {
        if conn.is_remote() {
            return Some(conn.clone());
        }
        conn.parent().and_then(|p| self.connections.get(p)).filter(|p| p.is_remote())
    }

    async fn open_persistent_read(
        &self,
        conn: &Arc<Connection>,
        name: &str,
    ) -> AgentResult<PathBuf> {
        if self.cache.is_in_flight(name) {
            return Err(AgentError::ChannelNotReady(name.to_string()));
        }
        let upstream = self.upstream(conn);
        let present = self.cache.contains(name);
        record_lookup(conn, present);

        match (present, upstream) {
            (true, None) => {}
            (true, Some(upstream)) => {
                let hash = self.cache.hash(name)?;
                let owned = name.to_string();
                let current = upstream
                    .call_remote(move |p, h| async move {
                        p.validate_channel(h, &owned, &hash).await
                    })
                    .await?;
                if !current {
                    tracing::info!(channel = name, "cached copy is stale, pulling again");
                    self.pull(&upstream, name, None).await?;
                }
            }
            (false, Some(upstream)) => self.pull(&upstream, name, None).await?,
            (false, None) => return Err(AgentError::ChannelNotFound(name.to_string())),
        }
        if !self.cache.contains(name) {
            return Err(AgentError::ChannelNotFound(name.to_string()));
        }
        self.cache.touch(name);
        Ok(self.cache.channel_path(name)?)
    }

    async fn open_job_read(
        &self,
        conn: &Arc<Connection>,
        job: JobGuid,
        name: &str,
    ) -> AgentResult<PathBuf> {
        let path = self.cache.job_channel_path(job, name)?;
        if !path.is_file() {
            match self.upstream(conn) {
                Some(upstream) => self.pull(&upstream, name, Some(job)).await?,
                None => return Err(AgentError::ChannelNotFound(name.to_string())),
            }
        }
        if path.is_file() {
            Ok(path)
        } else {
            Err(AgentError::ChannelNotFound(name.to_string()))
        }
    }

    /// Ask the upstream agent to push `name` back to us, with bounded retries
    async fn pull(
        &self,
        upstream: &Arc<Connection>,
        name: &str,
        job: Option<JobGuid>,
    ) -> AgentResult<()> {
        let mut last = AgentError::ChannelNotFound(name.to_string());
        for attempt in 1..=PULL_ATTEMPTS {
            let owned = name.to_string();
            let result = upstream
                .call_remote(move |p, h| async move { p.request_channel(h, &owned, job).await })
                .await;
            match result {
                Ok(()) => {
                    tracing::debug!(handle = %upstream.handle, channel = name, "channel pulled");
                    return Ok(());
                }
                Err(e @ AgentError::ConnectionDisconnected) => return Err(e),
                Err(e) => {
                    tracing::debug!(channel = name, attempt, error = %e, "channel pull failed");
                    last = e;
                }
            }
            tokio::time::sleep(PULL_BACKOFF * attempt).await;
        }
        tracing::warn!(channel = name, error = %last, "giving up on channel pull");
        Err(last)
    }

    /// Send a local channel to the agent behind `target`
    async fn push(
        &self,
        target: &Arc<Connection>,
        name: &str,
        job: Option<JobGuid>,
    ) -> AgentResult<()> {
        let data = match job {
            None => self.cache.read_channel(name)?,
            Some(job) => self.cache.read_job_channel(job, name)?,
        };
        let bytes = data.len() as u64;
        let owned = name.to_string();
        target
            .call_remote(move |p, h| async move { p.send_channel(h, &owned, job, data).await })
            .await?;
        target.lock().stats.bytes_sent += bytes;
        tracing::debug!(handle = %target.handle, channel = name, bytes, "channel pushed");
        Ok(())
    }
}

async fn grace_after(token: &CancellationToken) {
    token.cancelled().await;
    tokio::time::sleep(AGING_GRACE).await;
}

fn record_lookup(conn: &Connection, hit: bool) {
    let mut inner = conn.lock();
    inner.stats.cache_requests += 1;
    if hit {
        inner.stats.cache_hits += 1;
    } else {
        inner.stats.cache_misses += 1;
    }
}

async fn blocking<T, E>(f: impl FnOnce() -> Result<T, E> + Send + 'static) -> AgentResult<T>
where
    T: Send + 'static,
    E: Into<AgentError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::internal(format!("cache task: {e}")))?
        .map_err(Into::into)
}

#[cfg(test)]
#[path = "channels_tests.rs"]
mod tests;
