// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager.
//!
//! Admits local clients and remote workers, tears connections down in
//! order, and keeps the state this agent advertises to the coordinator
//! current. Remote admission is a two-phase handshake: the worker calls
//! back `ConfirmRemoteConnection` on the instigator before either side
//! commits the connection to its table.

use crate::agent::AgentDeps;
use crate::channels::ChannelService;
use crate::connection::{Connection, ConnectionState, ConnectionTable};
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::SharedConfig;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarm_adapters::{Coordinator, MachineState, PeerConnector, ProcessLauncher};
use swarm_adapters::TelemetrySink;
use swarm_core::{AgentError, AgentInfo, AgentResult, AgentState, Clock, Handle, JobFlags};
use swarm_core::{name_passes_filter, JobGuid, JobState};
use swarm_wire::{ConnectionEntry, OpenConnectionReply};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Minimum spacing of unforced coordinator heartbeats
pub const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Pause between successful liveness probes of a remote connection
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// Cache aging waits this long after the agent goes idle
pub const IDLE_CACHE_DELAY: Duration = Duration::from_secs(10);

struct AgentStatus {
    state: AgentState,
    working_for: Option<String>,
    last_assigned: u64,
    coordinator_responding: bool,
    last_ping: Option<Instant>,
    restart_requested: bool,
    owner_process: Option<u32>,
    had_connections: bool,
    cache_cleanup_after: Option<Instant>,
}

pub struct ConnectionManager {
    connections: Arc<ConnectionTable>,
    router: Arc<Router>,
    channels: Arc<ChannelService>,
    scheduler: Arc<Scheduler>,
    coordinator: Arc<dyn Coordinator>,
    connector: Arc<dyn PeerConnector>,
    launcher: Arc<dyn ProcessLauncher>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    config: SharedConfig,
    status: Mutex<AgentStatus>,
    /// Serializes the worker side of remote handshakes
    handshake: tokio::sync::Mutex<()>,
    idle: watch::Sender<u64>,
    started_at: Instant,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<ConnectionTable>,
        router: Arc<Router>,
        channels: Arc<ChannelService>,
        scheduler: Arc<Scheduler>,
        deps: &AgentDeps,
        clock: Arc<dyn Clock>,
        config: SharedConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let state = if config.read().standalone {
            AgentState::Standalone
        } else {
            AgentState::Available
        };
        let now = clock.now();
        Self {
            connections,
            router,
            channels,
            scheduler,
            coordinator: deps.coordinator.clone(),
            connector: deps.connector.clone(),
            launcher: deps.launcher.clone(),
            telemetry: deps.telemetry.clone(),
            clock,
            config,
            status: Mutex::new(AgentStatus {
                state,
                working_for: None,
                last_assigned: 0,
                coordinator_responding: true,
                last_ping: None,
                restart_requested: false,
                owner_process: None,
                had_connections: false,
                cache_cleanup_after: Some(now + IDLE_CACHE_DELAY),
            }),
            handshake: tokio::sync::Mutex::new(()),
            idle: watch::channel(0).0,
            started_at: now,
            shutdown,
        }
    }

    pub fn state(&self) -> AgentState {
        self.status.lock().state
    }

    pub fn set_state(&self, state: AgentState) {
        self.status.lock().state = state;
    }

    pub fn coordinator_responding(&self) -> bool {
        self.status.lock().coordinator_responding
    }

    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// The coordinator asked for a restart and nothing is connected
    pub fn restart_due(&self) -> bool {
        self.status.lock().restart_requested && self.connections.is_empty()
    }

    /// Idle and past the cache clean-up delay
    pub fn cache_cleanup_due(&self) -> bool {
        let due = self.status.lock().cache_cleanup_after;
        self.connections.is_empty() && due.is_some_and(|t| self.clock.now() >= t)
    }

    /// Clean-up ran; wait for the next idle transition
    pub fn cache_cleanup_done(&self) {
        self.status.lock().cache_cleanup_after = None;
    }

    /// Counter bumped on every idle transition
    pub fn subscribe_idle(&self) -> watch::Receiver<u64> {
        self.idle.subscribe()
    }

    /// What the coordinator heartbeat advertises
    pub fn agent_info(&self) -> AgentInfo {
        let config = self.config.read();
        let status = self.status.lock();
        AgentInfo {
            name: config.agent_name.clone(),
            group: config.group_name.clone(),
            user: std::env::var("USER").unwrap_or_default(),
            ip: config.advertise_ip.clone(),
            port: config.peer_port,
            state: status.state,
            working_for: status.working_for.clone(),
            local_cores: config.local_cores,
            remote_cores: config.remote_cores,
            assigned_to: None,
            assigned_time: None,
        }
    }

    pub fn entries(&self) -> Vec<ConnectionEntry> {
        let mut entries: Vec<ConnectionEntry> = self
            .connections
            .all()
            .iter()
            .map(|c| {
                let inner = c.lock();
                ConnectionEntry {
                    handle: c.handle,
                    kind: c.kind(),
                    state: inner.state.to_string(),
                    peer: c.peer_label(),
                    parent: inner.parent,
                    job: inner.job,
                    reservations: inner.reservations,
                }
            })
            .collect();
        entries.sort_by_key(|e| e.handle);
        entries
    }

    /// A handle from the coordinator, or a random one nothing here uses
    async fn allocate_handle(&self) -> Handle {
        let ask_coordinator = {
            let standalone = self.config.read().standalone;
            !standalone && self.status.lock().coordinator_responding
        };
        if ask_coordinator {
            match self.coordinator.get_unique_handle().await {
                Ok(h) if Handle(h).is_valid() && !self.connections.contains(Handle(h)) => {
                    return Handle(h);
                }
                Ok(h) => tracing::debug!(handle = h, "coordinator handle unusable"),
                Err(e) => {
                    tracing::warn!(error = %e, "coordinator not responding");
                    self.status.lock().coordinator_responding = false;
                }
            }
        }
        let mut rng = rand::thread_rng();
        loop {
            let handle = Handle(rng.gen_range(1..i32::MAX));
            if !self.connections.contains(handle) {
                return handle;
            }
        }
    }

    /// Admit a client process on this machine.
    ///
    /// A process spawned for an open job (or, for manually started jobs,
    /// one running the job's executable) becomes a child of the job's
    /// owner and shares its job.
    pub async fn open_local(
        &self,
        process_id: u32,
        process_is_owner: bool,
    ) -> AgentResult<OpenConnectionReply> {
        if self.shutdown.is_cancelled() {
            return Err(AgentError::InvalidArgument("agent is shutting down".to_string()));
        }
        let _waiting = self.channels.client_waiting();
        let _admit = self.connections.admit().await;

        let stale = self
            .connections
            .local_for_process(process_id)
            .filter(|c| c.state() == ConnectionState::Connected);
        if let Some(stale) = stale {
            tracing::info!(handle = %stale.handle, pid = process_id, "replacing stale connection");
            if let Err(e) = self.close(stale.handle).await {
                tracing::warn!(handle = %stale.handle, error = %e, "stale close failed");
            }
        }

        let handle = self.allocate_handle().await;
        let conn = Arc::new(Connection::local(handle, process_id, self.clock.now()));
        let parent = self.find_parent(process_id);
        {
            let mut inner = conn.lock();
            inner.state = ConnectionState::Connected;
            if let Some((parent, job)) = &parent {
                inner.parent = Some(parent.handle);
                inner.job = Some(*job);
            }
        }
        if let Some((parent, _)) = &parent {
            let mut inner = parent.lock();
            inner.local_children.push(handle);
            inner.children_seen += 1;
        }
        self.connections.insert(conn);

        {
            let mut status = self.status.lock();
            status.had_connections = true;
            if process_is_owner {
                status.owner_process = Some(process_id);
            }
        }
        if parent.is_none() {
            {
                let mut status = self.status.lock();
                if status.state != AgentState::Standalone {
                    status.state = AgentState::Working;
                }
            }
            self.ping_coordinator(true).await;
        }

        let parent_handle = parent.as_ref().map(|(p, _)| p.handle);
        tracing::info!(%handle, pid = process_id, parent = ?parent_handle, "local connection");
        Ok(OpenConnectionReply {
            handle,
            agent_process_id: std::process::id(),
            cache_root: self.channels.cache().root(),
            job: parent.as_ref().map(|(_, job)| *job),
            is_pure_local: parent.as_ref().is_none_or(|(p, _)| p.is_local()),
        })
    }

    fn find_parent(&self, process_id: u32) -> Option<(Arc<Connection>, JobGuid)> {
        let jobs = self.scheduler.jobs().all();
        let open = || jobs.iter().filter(|j| j.state() != JobState::Closed);
        let spawned = open().find(|j| j.process().is_some_and(|p| p.pid() == process_id));
        let job = spawned.or_else(|| {
            let exe = self.launcher.executable_name(process_id)?;
            open().find(|j| {
                j.flags().contains(JobFlags::MANUAL_START)
                    && j.effective_spec().is_some_and(|s| {
                        s.original_name(&s.executable).eq_ignore_ascii_case(&exe)
                    })
            })
        })?;
        let owner = self
            .connections
            .get(job.owner)
            .filter(|o| o.state() == ConnectionState::Connected)?;
        Some((owner, job.guid))
    }

    /// Worker side of the handshake: another agent asks us to work for it.
    ///
    /// `Ok(None)` is a refusal (standalone, busy, stale assignment or an
    /// unknown requester); errors come from the confirmation callback.
    pub async fn open_remote(
        &self,
        requesting_agent: &str,
        handle: Handle,
        assigned: bool,
        assigned_time: u64,
    ) -> AgentResult<Option<Handle>> {
        let (standalone, own_name) = {
            let config = self.config.read();
            (config.standalone, config.agent_name.clone())
        };
        if standalone || self.shutdown.is_cancelled() || requesting_agent == own_name {
            return Ok(None);
        }
        // Held until the connection is in the table, so two instigators
        // cannot both find this agent free
        let _handshake = self.handshake.lock().await;
        if self.status.lock().state == AgentState::Busy {
            tracing::debug!(agent = requesting_agent, "marked busy, refusing remote connection");
            return Ok(None);
        }
        if assigned {
            if assigned_time <= self.status.lock().last_assigned {
                tracing::info!(agent = requesting_agent, assigned_time, "stale assignment");
                return Ok(None);
            }
            let instigating = self
                .scheduler
                .jobs()
                .all()
                .iter()
                .any(|j| j.owner_is_instigator && j.state() != JobState::Closed);
            if instigating {
                tracing::info!(agent = requesting_agent, "busy with a job of our own");
                return Ok(None);
            }
            for existing in self.connections.all().into_iter().filter(|c| c.is_remote()) {
                tracing::info!(handle = %existing.handle, "evicted by assignment");
                if let Err(e) = self.close(existing.handle).await {
                    tracing::warn!(handle = %existing.handle, error = %e, "eviction failed");
                }
            }
        } else if !self.connections.is_empty() {
            tracing::debug!(agent = requesting_agent, "busy, refusing remote connection");
            return Ok(None);
        }
        if self.connections.contains(handle) {
            return Err(AgentError::InvalidArgument(format!("handle {handle} already in use")));
        }

        let directory = match self.coordinator.get_available_agents(None).await {
            Ok(agents) => agents,
            Err(e) => {
                tracing::warn!(error = %e, "cannot verify requesting agent");
                self.status.lock().coordinator_responding = false;
                return Ok(None);
            }
        };
        let Some(requester) = directory.into_iter().find(|a| a.name == requesting_agent) else {
            tracing::warn!(agent = requesting_agent, "requesting agent unknown to coordinator");
            return Ok(None);
        };
        let peer = self.connector.connect(&requester);
        if !peer.ping_host().await {
            tracing::warn!(agent = requesting_agent, "requesting agent unreachable");
            return Ok(None);
        }

        let conn = Arc::new(Connection::remote(handle, requester, peer, self.clock.now()));
        let confirmed = conn
            .call_remote(|p, h| async move { p.confirm_remote_connection(h).await })
            .await?;
        if !confirmed {
            return Ok(None);
        }

        let _admit = self.connections.admit().await;
        conn.set_state(ConnectionState::Connected);
        self.connections.insert(conn.clone());
        {
            let mut status = self.status.lock();
            status.had_connections = true;
            status.working_for = Some(requesting_agent.to_string());
            status.state = AgentState::Working;
            if assigned {
                status.last_assigned = assigned_time;
            }
        }
        self.telemetry.update_machine_state(requesting_agent, MachineState::InstigatorConnected);
        self.spawn_monitor(conn);
        self.ping_coordinator(true).await;
        tracing::info!(%handle, agent = requesting_agent, "working for remote agent");
        Ok(Some(handle))
    }

    /// Instigator side of the confirmation callback
    pub fn confirm_remote(&self, handle: Handle) -> AgentResult<bool> {
        if self.connections.is_pending(handle) {
            Ok(true)
        } else {
            tracing::warn!(%handle, "confirmation for a handle we never offered");
            Err(AgentError::ConnectionNotFound)
        }
    }

    /// Ask `agent` to work for the job `parent` owns.
    ///
    /// `Ok(None)` means the agent declined; the caller parks it for retry.
    pub async fn try_open_remote(
        &self,
        parent: &Arc<Connection>,
        agent: AgentInfo,
    ) -> AgentResult<Option<Arc<Connection>>> {
        let own_name = self.config.read().agent_name.clone();
        let handle = self.allocate_handle().await;
        let peer = self.connector.connect(&agent);
        let conn = Arc::new(Connection::remote(handle, agent.clone(), peer, self.clock.now()));

        self.connections.add_pending(conn.clone());
        let (assigned, assigned_time) = match &agent.assigned_to {
            Some(to) if *to == own_name => (true, agent.assigned_time.unwrap_or_default()),
            _ => (false, 0),
        };
        let opened = conn
            .call_remote(|p, h| async move {
                p.open_remote_connection(&own_name, h, assigned, assigned_time).await
            })
            .await;
        self.connections.take_pending(handle);

        match opened? {
            Some(_) => {}
            None => {
                tracing::info!(agent = %agent.name, "remote agent declined");
                return Ok(None);
            }
        }

        let _admit = self.connections.admit().await;
        {
            let mut inner = conn.lock();
            inner.state = ConnectionState::Connected;
            inner.parent = Some(parent.handle);
            inner.job = parent.job();
        }
        {
            let mut inner = parent.lock();
            inner.remote_children.push(handle);
            inner.children_seen += 1;
        }
        self.connections.insert(conn.clone());
        self.telemetry.update_machine_state(&agent.name, MachineState::RemoteConnected);
        self.spawn_monitor(conn.clone());
        tracing::info!(%handle, agent = %agent.name, parent = %parent.handle, "remote worker");
        Ok(Some(conn))
    }

    /// Close a connection and notify the peer if it is remote
    pub async fn close(&self, handle: Handle) -> AgentResult<()> {
        self.close_with(handle, true).await
    }

    /// Close a connection. Closing one that is already going away is a
    /// no-op.
    pub fn close_with(&self, handle: Handle, notify_peer: bool) -> BoxFuture<'_, AgentResult<()>> {
        async move {
            let conn = self.connections.require(handle)?;
            {
                let mut inner = conn.lock();
                if inner.state != ConnectionState::Connected {
                    return Ok(());
                }
                inner.state = ConnectionState::Disconnecting;
            }
            tracing::info!(%handle, peer = %conn.peer_label(), "closing connection");
            self.router.flush(handle, false).await;

            match self.scheduler.job_for(&conn) {
                Ok(job) if job.owner == handle => {
                    if job.state() != JobState::Closed {
                        self.scheduler.finish_job(&conn, &job).await;
                    }
                }
                Ok(_) => self.scheduler.release_connection(&conn),
                Err(_) => {}
            }

            let (local_children, remote_children, parent) = {
                let mut inner = conn.lock();
                let local = std::mem::take(&mut inner.local_children);
                (local, std::mem::take(&mut inner.remote_children), inner.parent)
            };
            for child in local_children.iter().filter_map(|h| self.connections.get(*h)) {
                child.lock().parent = None;
            }
            for child in remote_children {
                if let Err(e) = self.close_with(child, true).await {
                    tracing::debug!(handle = %child, error = %e, "remote child already gone");
                }
            }

            if let Some(remote) = conn.as_remote() {
                if notify_peer && !conn.is_dropped() {
                    let closed =
                        conn.call_remote(|p, h| async move { p.close_connection(h).await }).await;
                    if let Err(e) = closed {
                        tracing::debug!(%handle, error = %e, "peer close failed");
                    }
                }
                let state = if parent.is_some() {
                    MachineState::RemoteDisconnected
                } else {
                    MachineState::InstigatorDisconnected
                };
                self.telemetry.update_machine_state(&remote.info.name, state);
            }

            if let Some(parent) = parent.and_then(|p| self.connections.get(p)) {
                {
                    let mut inner = parent.lock();
                    inner.local_children.retain(|h| *h != handle);
                    inner.remote_children.retain(|h| *h != handle);
                }
                if let (Some(remote), Some(local)) = (conn.as_remote(), parent.as_local()) {
                    if !*local.potential.abandoned.lock() {
                        local.potential.unavailable.push(remote.info.clone());
                    }
                }
            }

            self.router.flush(handle, true).await;
            tracing::debug!(%handle, "connection closed");
            Ok(())
        }
        .boxed()
    }

    /// Close every connection, remote workers first
    pub async fn close_all(&self) {
        let mut all = self.connections.all();
        all.sort_by_key(|c| c.is_local());
        for conn in all {
            if let Err(e) = self.close(conn.handle).await {
                tracing::debug!(handle = %conn.handle, error = %e, "close on shutdown");
            }
        }
    }

    /// Periodic upkeep: close dropped connections, collect disconnected
    /// ones and track the idle transition. Returns connections removed.
    pub async fn maintain_connections(&self) -> usize {
        for conn in self.connections.all() {
            if conn.state() != ConnectionState::Connected {
                continue;
            }
            let dropped = match conn.as_local() {
                Some(local) => !self.launcher.is_alive(local.process_id),
                None => conn.is_dropped(),
            };
            if dropped {
                tracing::info!(handle = %conn.handle, peer = %conn.peer_label(), "dropped");
                if let Err(e) = self.close_with(conn.handle, false).await {
                    tracing::warn!(handle = %conn.handle, error = %e, "close of dropped failed");
                }
            }
        }

        let timeout = self.config.read().remote_timeout();
        let now = self.clock.now();
        let mut removed = 0;
        for conn in self.connections.all() {
            let (state, job, disconnected_at) = {
                let inner = conn.lock();
                (inner.state, inner.job, inner.disconnected_at)
            };
            if state != ConnectionState::Disconnected {
                continue;
            }
            let collectable = match conn.as_local() {
                Some(local) => {
                    let timed_out = job.is_none()
                        && disconnected_at
                            .is_some_and(|t| now.saturating_duration_since(t) >= timeout);
                    local.mailbox.is_empty() || timed_out
                }
                None => true,
            };
            if collectable && self.connections.remove(conn.handle).is_some() {
                self.channels.discard_open_channels(&conn);
                if let Some(local) = conn.as_local() {
                    local.mailbox.clear();
                }
                tracing::debug!(handle = %conn.handle, "connection collected");
                removed += 1;
            }
        }

        self.check_owner_process();
        self.track_idle().await;
        removed
    }

    fn check_owner_process(&self) {
        let owner = self.status.lock().owner_process;
        if let Some(pid) = owner.filter(|pid| !self.launcher.is_alive(*pid)) {
            tracing::info!(pid, "owner process exited, shutting down");
            self.status.lock().owner_process = None;
            self.shutdown.cancel();
        }
    }

    async fn track_idle(&self) {
        let empty = self.connections.is_empty();
        let went_idle = {
            let mut status = self.status.lock();
            let went_idle = empty && status.had_connections;
            status.had_connections = !empty;
            if went_idle {
                if status.state != AgentState::Standalone {
                    status.state = AgentState::Available;
                }
                status.working_for = None;
                status.coordinator_responding = true;
                status.cache_cleanup_after = Some(self.clock.now() + IDLE_CACHE_DELAY);
            }
            went_idle
        };
        if went_idle {
            tracing::info!("agent idle");
            self.idle.send_modify(|n| *n += 1);
            self.ping_coordinator(true).await;
        }
    }

    /// Heartbeat the coordinator, at most once a minute unless forced
    pub async fn ping_coordinator(&self, force: bool) {
        if self.config.read().standalone {
            return;
        }
        let now = self.clock.now();
        {
            let mut status = self.status.lock();
            let recent = status
                .last_ping
                .is_some_and(|t| now.saturating_duration_since(t) < PING_INTERVAL);
            if recent && !force {
                return;
            }
            status.last_ping = Some(now);
        }
        let info = self.agent_info();
        match self.coordinator.ping(&info).await {
            Ok(restart) => {
                let mut status = self.status.lock();
                status.coordinator_responding = true;
                if restart && !status.restart_requested {
                    tracing::warn!("coordinator requested a restart");
                    status.restart_requested = true;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "coordinator ping failed");
                self.status.lock().coordinator_responding = false;
            }
        }
    }

    /// Refill the owner's candidate list from the coordinator directory
    pub async fn reset_potential_agents(&self, owner: &Connection) -> usize {
        let Some(local) = owner.as_local() else {
            return 0;
        };
        let (own_name, group, filter) = {
            let config = self.config.read();
            (
                config.agent_name.clone(),
                config.allowed_remote_agent_group.clone(),
                config.allowed_remote_agent_names.clone(),
            )
        };
        let group = (!group.is_empty()).then_some(group);
        let agents = match self.coordinator.get_available_agents(group.as_deref()).await {
            Ok(agents) => agents,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list remote agents");
                self.status.lock().coordinator_responding = false;
                Vec::new()
            }
        };
        let children: Vec<String> = {
            let remote_children = owner.lock().remote_children.clone();
            remote_children
                .iter()
                .filter_map(|h| self.connections.get(*h))
                .map(|c| c.peer_label())
                .collect()
        };
        let candidates: Vec<AgentInfo> = agents
            .into_iter()
            .filter(|a| a.name != own_name && name_passes_filter(&a.name, &filter))
            .filter(|a| !children.contains(&a.name))
            .filter(|a| !matches!(a.state, AgentState::Standalone | AgentState::Closed))
            .collect();
        let count = candidates.len();
        local.potential.unavailable.clear();
        local.potential.potential.replace(candidates);
        *local.potential.abandoned.lock() = false;
        tracing::debug!(handle = %owner.handle, count, "potential remote agents");
        count
    }

    pub fn next_remote_agent(&self, owner: &Connection) -> Option<AgentInfo> {
        owner.as_local()?.potential.potential.pop()
    }

    /// Park an agent that declined until the next retry pass
    pub fn park_unavailable(&self, owner: &Connection, agent: AgentInfo) {
        if let Some(local) = owner.as_local() {
            if !*local.potential.abandoned.lock() {
                local.potential.unavailable.push(agent);
            }
        }
    }

    /// Move parked agents back to the candidate list. Returns how many.
    pub fn retry_unavailable(&self, owner: &Connection) -> usize {
        let Some(local) = owner.as_local() else {
            return 0;
        };
        let parked = local.potential.unavailable.drain();
        let count = parked.len();
        for agent in parked {
            local.potential.potential.push(agent);
        }
        count
    }

    pub fn abandon_potential_agents(&self, owner: &Connection) {
        if let Some(local) = owner.as_local() {
            *local.potential.abandoned.lock() = true;
            local.potential.potential.clear();
            local.potential.unavailable.clear();
        }
    }

    fn spawn_monitor(&self, conn: Arc<Connection>) {
        let timeout = self.config.read().remote_timeout();
        tokio::spawn(monitor_remote(conn, timeout, self.shutdown.clone()));
    }
}

/// Probe a remote connection until it drops or closes
async fn monitor_remote(conn: Arc<Connection>, timeout: Duration, shutdown: CancellationToken) {
    let Some(remote) = conn.as_remote() else {
        return;
    };
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = remote.dropped.cancelled() => return,
            _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
        }
        if conn.state() != ConnectionState::Connected {
            return;
        }
        if !remote.peer.ping_host().await {
            conn.signal_dropped();
            return;
        }
        let probe = conn.call_remote(|p, h| async move { p.test_connection(h).await });
        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) | Ok(Err(_)) | Err(_) => {
                conn.signal_dropped();
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
