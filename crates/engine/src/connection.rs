// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connections and the connection table.
//!
//! A connection is either Local (a client process on this machine, with a
//! mailbox) or Remote (another agent, reached through an [`AgentPeer`]).
//! Mutable bookkeeping sits behind one short-lived lock per connection;
//! nothing here holds a lock across an `.await`.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarm_adapters::{AgentPeer, PeerError};
use swarm_core::{AgentError, AgentInfo, AgentResult, ChannelFlags, Handle, JobGuid, Message};
use swarm_core::{RwMap, RwQueue};
use swarm_wire::ConnectionKind;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Connected,
    Disconnecting,
    Disconnected,
}

swarm_core::simple_display! {
    ConnectionState {
        Uninitialized => "uninitialized",
        Connected => "connected",
        Disconnecting => "disconnecting",
        Disconnected => "disconnected",
    }
}

/// Cache and network counters for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub cache_requests: u64,
    pub cache_misses: u64,
    pub cache_hits: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// A channel a client currently has open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannel {
    pub name: String,
    pub flags: ChannelFlags,
    /// Where the client reads or writes; the staging file for write channels
    pub path: PathBuf,
    pub job: Option<JobGuid>,
}

/// Mutable connection bookkeeping
#[derive(Debug, Default)]
pub struct ConnectionInner {
    pub state: ConnectionState,
    pub parent: Option<Handle>,
    pub local_children: Vec<Handle>,
    pub remote_children: Vec<Handle>,
    /// Children ever attached; a remote worker with none left is finished
    pub children_seen: u32,
    pub job: Option<JobGuid>,
    pub open_channels: BTreeMap<i32, OpenChannel>,
    pub next_channel: i32,
    /// Outstanding task reservations held against `job`
    pub reservations: u32,
    pub disconnected_at: Option<Instant>,
    pub stats: ConnectionStats,
}

/// Pending messages for a local client, signalled through a semaphore
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    ready: Semaphore,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self {
            queue: Mutex::default(),
            ready: Semaphore::new(0),
        }
    }
}

impl Mailbox {
    pub fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
        self.ready.add_permits(1);
    }

    pub fn pop(&self) -> Option<Message> {
        let message = self.queue.lock().pop_front();
        if message.is_some() {
            if let Ok(permit) = self.ready.try_acquire() {
                permit.forget();
            }
        }
        message
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Wake any waiter without queueing a message
    pub fn signal(&self) {
        self.ready.add_permits(1);
    }

    /// Wait until signalled or `timeout` elapses. Returns false on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.ready.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                true
            }
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }
}

/// Remote agents this instigator may still recruit
#[derive(Default)]
pub struct PotentialAgents {
    pub potential: RwQueue<AgentInfo>,
    pub unavailable: RwQueue<AgentInfo>,
    pub abandoned: Mutex<bool>,
}

pub struct LocalEnd {
    pub process_id: u32,
    pub mailbox: Mailbox,
    pub potential: PotentialAgents,
}

pub struct RemoteEnd {
    pub info: AgentInfo,
    pub peer: Arc<dyn AgentPeer>,
    /// Fired when the peer stops answering
    pub dropped: CancellationToken,
    /// Foreign handles that arrive over this connection
    pub aliases: Mutex<Vec<Handle>>,
}

pub enum Endpoint {
    Local(LocalEnd),
    Remote(RemoteEnd),
}

pub struct Connection {
    pub handle: Handle,
    pub endpoint: Endpoint,
    pub created_at: Instant,
    inner: Mutex<ConnectionInner>,
}

impl Connection {
    pub fn local(handle: Handle, process_id: u32, now: Instant) -> Self {
        Self {
            handle,
            endpoint: Endpoint::Local(LocalEnd {
                process_id,
                mailbox: Mailbox::default(),
                potential: PotentialAgents::default(),
            }),
            created_at: now,
            inner: Mutex::new(ConnectionInner::default()),
        }
    }

    pub fn remote(
        handle: Handle,
        info: AgentInfo,
        peer: Arc<dyn AgentPeer>,
        now: Instant,
    ) -> Self {
        Self {
            handle,
            endpoint: Endpoint::Remote(RemoteEnd {
                info,
                peer,
                dropped: CancellationToken::new(),
                aliases: Mutex::new(Vec::new()),
            }),
            created_at: now,
            inner: Mutex::new(ConnectionInner::default()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock()
    }

    pub fn kind(&self) -> ConnectionKind {
        match self.endpoint {
            Endpoint::Local(_) => ConnectionKind::Local,
            Endpoint::Remote(_) => ConnectionKind::Remote,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.endpoint, Endpoint::Local(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.endpoint, Endpoint::Remote(_))
    }

    pub fn as_local(&self) -> Option<&LocalEnd> {
        match &self.endpoint {
            Endpoint::Local(local) => Some(local),
            Endpoint::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteEnd> {
        match &self.endpoint {
            Endpoint::Remote(remote) => Some(remote),
            Endpoint::Local(_) => None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.inner.lock().state = state;
    }

    pub fn parent(&self) -> Option<Handle> {
        self.inner.lock().parent
    }

    pub fn job(&self) -> Option<JobGuid> {
        self.inner.lock().job
    }

    pub fn reservations(&self) -> u32 {
        self.inner.lock().reservations
    }

    /// Name of the machine doing the work on this connection
    pub fn machine_name(&self, own_name: &str) -> String {
        match &self.endpoint {
            Endpoint::Local(_) => own_name.to_string(),
            Endpoint::Remote(remote) => remote.info.name.clone(),
        }
    }

    /// Process id for local connections, agent name for remote ones
    pub fn peer_label(&self) -> String {
        match &self.endpoint {
            Endpoint::Local(local) => local.process_id.to_string(),
            Endpoint::Remote(remote) => remote.info.name.clone(),
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.as_remote().is_some_and(|r| r.dropped.is_cancelled())
    }

    /// Mark a remote connection as no longer answering
    pub fn signal_dropped(&self) {
        if let Some(remote) = self.as_remote() {
            if !remote.dropped.is_cancelled() {
                let agent = &remote.info.name;
                tracing::warn!(handle = %self.handle, %agent, "connection dropped");
                remote.dropped.cancel();
            }
        }
    }

    /// Mark disconnected and wake any client blocked on the mailbox
    pub fn mark_disconnected(&self, now: Instant) {
        {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Disconnected;
            inner.disconnected_at.get_or_insert(now);
        }
        if let Some(local) = self.as_local() {
            local.mailbox.signal();
        }
    }

    /// Issue one call to the peer behind a remote connection.
    ///
    /// The call races the connection's dropped signal. Transport failures
    /// mark the connection dropped; errors the peer itself returned do not.
    pub async fn call_remote<T, F, Fut>(&self, op: F) -> AgentResult<T>
    where
        F: FnOnce(Arc<dyn AgentPeer>, Handle) -> Fut,
        Fut: Future<Output = Result<T, PeerError>>,
    {
        let Some(remote) = self.as_remote() else {
            return Err(AgentError::InvalidArgument(format!(
                "connection {} is not remote",
                self.handle
            )));
        };
        if remote.dropped.is_cancelled() {
            return Err(AgentError::ConnectionDisconnected);
        }
        tokio::select! {
            result = op(remote.peer.clone(), self.handle) => match result {
                Ok(value) => Ok(value),
                Err(PeerError::Remote(e)) => Err(e),
                Err(e) => {
                    tracing::warn!(handle = %self.handle, error = %e, "remote call failed");
                    self.signal_dropped();
                    Err(e.to_agent_error())
                }
            },
            _ = remote.dropped.cancelled() => Err(AgentError::ConnectionDisconnected),
        }
    }
}

/// Every live connection, keyed by handle. Aliases are extra keys that
/// resolve to the remote connection they arrived on.
#[derive(Default)]
pub struct ConnectionTable {
    connections: RwMap<Handle, Arc<Connection>>,
    /// Remote handles offered to a peer and awaiting its confirmation
    pending: RwMap<Handle, Arc<Connection>>,
    /// Held for writing while no connection may be admitted
    admission: tokio::sync::RwLock<()>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: Handle) -> Option<Arc<Connection>> {
        self.connections.get(&handle)
    }

    pub fn require(&self, handle: Handle) -> AgentResult<Arc<Connection>> {
        self.get(handle).ok_or(AgentError::ConnectionNotFound)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.connections.contains_key(&handle) || self.pending.contains_key(&handle)
    }

    pub fn insert(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.handle, connection);
    }

    /// Register `alias` as another name for a remote connection
    pub fn add_alias(&self, alias: Handle, connection: &Arc<Connection>) -> bool {
        let Some(remote) = connection.as_remote() else {
            return false;
        };
        if !self.connections.try_insert(alias, connection.clone()) {
            return false;
        }
        remote.aliases.lock().push(alias);
        tracing::debug!(alias = %alias, handle = %connection.handle, "registered routing alias");
        true
    }

    /// Remove a connection along with all of its aliases
    pub fn remove(&self, handle: Handle) -> Option<Arc<Connection>> {
        let connection = self.connections.remove(&handle)?;
        if let Some(remote) = connection.as_remote() {
            for alias in remote.aliases.lock().drain(..) {
                self.connections.remove(&alias);
            }
        }
        Some(connection)
    }

    /// Every connection once, aliases excluded
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.with_read(|map| {
            map.iter().filter(|(h, c)| **h == c.handle).map(|(_, c)| c.clone()).collect()
        })
    }

    /// Connection count, aliases excluded
    pub fn len(&self) -> usize {
        self.connections.with_read(|map| map.iter().filter(|(h, c)| **h == c.handle).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn local_for_process(&self, process_id: u32) -> Option<Arc<Connection>> {
        self.all().into_iter().find(|c| c.as_local().is_some_and(|l| l.process_id == process_id))
    }

    pub fn add_pending(&self, connection: Arc<Connection>) {
        self.pending.insert(connection.handle, connection);
    }

    pub fn take_pending(&self, handle: Handle) -> Option<Arc<Connection>> {
        self.pending.remove(&handle)
    }

    pub fn is_pending(&self, handle: Handle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Block admission of new connections while the guard lives
    pub async fn exclusive(&self) -> tokio::sync::RwLockWriteGuard<'_, ()> {
        self.admission.write().await
    }

    /// Held while a connection is being admitted
    pub async fn admit(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
        self.admission.read().await
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
