// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message router.
//!
//! Senders push onto an incoming queue; a single loop swaps it out and
//! dispatches each message in order. TASK_REQUEST and TASK_STATE are
//! answered from the job table here; everything else goes to a local
//! mailbox or across the peer connection.

use crate::connection::{Connection, ConnectionState, ConnectionTable};
use crate::job::JobTable;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{AgentError, AgentResult, Clock, DefaultRoute, Handle, Message, MessageBody};
use swarm_core::{TaskGuid, TaskResponse, TaskState};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

/// Longest the loop sleeps without being woken
pub const ROUTER_TICK: Duration = Duration::from_millis(500);

enum Queued {
    Deliver {
        message: Message,
        /// Remote connection the message arrived on
        via: Option<Handle>,
    },
    Flush {
        handle: Handle,
        disconnect: bool,
        done: oneshot::Sender<()>,
    },
}

pub struct Router {
    connections: Arc<ConnectionTable>,
    jobs: Arc<JobTable>,
    clock: Arc<dyn Clock>,
    incoming: Mutex<Vec<Queued>>,
    wake: Notify,
    /// Shared by senders, exclusive for a flush
    send_lock: RwLock<()>,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(
        connections: Arc<ConnectionTable>,
        jobs: Arc<JobTable>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            jobs,
            clock,
            incoming: Mutex::new(Vec::new()),
            wake: Notify::new(),
            send_lock: RwLock::new(()),
            shutdown,
        }
    }

    /// Dispatch loop; returns once the shutdown token fires
    pub async fn run(self: Arc<Self>) {
        tracing::debug!("message router started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(ROUTER_TICK) => {}
            }
            self.process_pending().await;
        }
        // Dropping queued flushes releases their waiters
        let dropped = std::mem::take(&mut *self.incoming.lock()).len();
        tracing::debug!(dropped, "message router stopped");
    }

    /// Dispatch one swapped-out generation of the queue
    pub async fn process_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.incoming.lock());
        let count = batch.len();
        for item in batch {
            match item {
                Queued::Deliver { message, via } => self.dispatch(message, via).await,
                Queued::Flush { handle, disconnect, done } => {
                    if disconnect {
                        if let Some(conn) = self.connections.get(handle) {
                            conn.mark_disconnected(self.clock.now());
                        }
                    }
                    let _ = done.send(());
                }
            }
        }
        count
    }

    /// Number of items waiting for the next tick
    pub fn queued(&self) -> usize {
        self.incoming.lock().len()
    }

    /// Accept a message from a local client, filling in default routing
    pub fn send_message(&self, sender: Handle, mut message: Message) -> AgentResult<()> {
        let conn = self.connections.require(sender)?;
        if conn.state() == ConnectionState::Disconnected {
            return Err(AgentError::ConnectionDisconnected);
        }
        let kind = message.kind();
        let Some(route) = kind.default_route() else {
            tracing::warn!(handle = %sender, %kind, "rejected message type from client");
            return Err(AgentError::InvalidArgument(format!("clients may not send {kind}")));
        };
        message.from.get_or_insert(sender);
        if message.to.is_none() {
            message.to = Some(self.default_destination(&conn, route));
        }
        self.push(Queued::Deliver { message, via: None });
        Ok(())
    }

    /// Accept a message another agent sent over remote connection `via`
    pub fn receive_from_peer(&self, via: Handle, mut message: Message) -> AgentResult<()> {
        let conn = self.connections.require(via)?;
        if !conn.is_remote() {
            return Err(AgentError::InvalidArgument(format!("connection {via} is not remote")));
        }
        message.from.get_or_insert(via);
        if message.to.is_none() {
            let Some(route) = message.kind().default_route() else {
                return Err(AgentError::InvalidArgument("message has no destination".to_string()));
            };
            message.to = Some(self.default_destination(&conn, route));
        }
        self.push(Queued::Deliver { message, via: Some(via) });
        Ok(())
    }

    /// Queue a message the agent produced itself; `from` and `to` are set
    pub fn enqueue(&self, message: Message) {
        self.push(Queued::Deliver { message, via: None });
    }

    pub fn enqueue_all(&self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.enqueue(message);
        }
    }

    /// Wait until everything queued before this call has been dispatched.
    ///
    /// With `disconnect`, the connection is marked disconnected at the
    /// barrier, so nothing queued afterwards reaches its mailbox first.
    pub async fn flush(&self, handle: Handle, disconnect: bool) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let (done, barrier) = oneshot::channel();
        {
            let _exclusive = self.send_lock.write();
            self.incoming.lock().push(Queued::Flush { handle, disconnect, done });
        }
        self.wake.notify_one();
        tokio::select! {
            _ = barrier => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// Long-poll a local connection's mailbox.
    ///
    /// Returns `Ok(None)` on timeout and `ConnectionDisconnected` once the
    /// connection is gone and nothing is left to read.
    pub async fn get_message(
        &self,
        handle: Handle,
        timeout: Duration,
    ) -> AgentResult<Option<Message>> {
        let conn = self.connections.require(handle)?;
        let Some(local) = conn.as_local() else {
            return Err(AgentError::InvalidArgument(format!("connection {handle} is not local")));
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = local.mailbox.pop() {
                return Ok(Some(message));
            }
            if conn.state() == ConnectionState::Disconnected {
                return Err(AgentError::ConnectionDisconnected);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() || !local.mailbox.wait(remaining).await {
                return Ok(local.mailbox.pop());
            }
        }
    }

    fn push(&self, item: Queued) {
        {
            let _shared = self.send_lock.read();
            self.incoming.lock().push(item);
        }
        self.wake.notify_one();
    }

    fn default_destination(&self, conn: &Connection, route: DefaultRoute) -> Handle {
        match route {
            DefaultRoute::Sender => conn.handle,
            DefaultRoute::Parent => conn
                .parent()
                .and_then(|p| self.connections.get(p))
                .filter(|p| p.state() == ConnectionState::Connected)
                .map_or(conn.handle, |p| p.handle),
        }
    }

    async fn dispatch(&self, mut message: Message, via: Option<Handle>) {
        let Some(to) = message.to else {
            tracing::warn!(kind = %message.kind(), "dropping message without destination");
            return;
        };
        if let (Some(via), Some(from)) = (via, message.from) {
            if self.connections.get(from).is_none() {
                if let Some(conn) = self.connections.get(via) {
                    self.connections.add_alias(from, &conn);
                }
            }
        }
        let Some(mut target) = self.connections.get(to) else {
            tracing::debug!(to = %to, kind = %message.kind(), "destination gone, message dropped");
            return;
        };
        let source = message.from.and_then(|h| self.connections.get(h));

        if let Some(source) = &source {
            if source.is_remote() && target.is_remote() {
                if let Some(parent) = target.parent().and_then(|p| self.connections.get(p)) {
                    message.to = Some(parent.handle);
                    target = parent;
                }
            }
        }

        match &message.body {
            MessageBody::TaskRequest => {
                if let Some(source) = source {
                    self.answer_task_request(&source).await;
                }
                return;
            }
            MessageBody::TaskState { task, state, .. } => {
                let Some(source) = source else {
                    return;
                };
                if !self.apply_task_state(&source, *task, *state) {
                    return;
                }
            }
            _ => {}
        }

        // Replies addressed to the upstream connection stop here
        if target.is_remote() && via == Some(target.handle) {
            tracing::debug!(kind = %message.kind(), "message for upstream consumed");
            return;
        }
        self.deliver(message, &target).await;
    }

    async fn answer_task_request(&self, requester: &Arc<Connection>) {
        let Some(job) = requester.job().and_then(|g| self.jobs.get(g)) else {
            tracing::debug!(handle = %requester.handle, "task request without a job");
            return;
        };
        let replies = job.get_next_task(&self.connections, requester);
        let reserved = replies.iter().any(|m| {
            matches!(
                &m.body,
                MessageBody::TaskRequestResponse { response: TaskResponse::Reservation { .. } }
            )
        });
        self.enqueue_all(replies);

        // A worker agent asks the instigator on behalf of its local client
        if reserved && requester.is_local() {
            if let Some(owner) = self.connections.get(job.owner).filter(|o| o.is_remote()) {
                let upstream =
                    Message::routed(requester.handle, owner.handle, MessageBody::TaskRequest);
                self.deliver(upstream, &owner).await;
            }
        }
    }

    /// Update task bookkeeping; returns whether to forward the report
    fn apply_task_state(&self, source: &Connection, task: TaskGuid, state: TaskState) -> bool {
        let Some(job) = source.job().and_then(|g| self.jobs.get(g)) else {
            return true;
        };
        let out = job.update_task_state(&self.connections, task, state);
        self.enqueue_all(out);
        !job.owner_is_instigator || matches!(state, TaskState::Success | TaskState::Failure)
    }

    async fn deliver(&self, message: Message, target: &Arc<Connection>) {
        if let Some(local) = target.as_local() {
            local.mailbox.push(message);
            return;
        }
        let kind = message.kind();
        if let MessageBody::TaskRequestResponse {
            response: TaskResponse::Specification { job, task },
        } = &message.body
        {
            let (job, task) = (*job, task.clone());
            let guid = task.guid;
            let sent = target
                .call_remote(move |p, h| async move { p.add_task(h, vec![task]).await })
                .await;
            if let Err(e) = sent {
                let handle = target.handle;
                tracing::warn!(%handle, task = %guid, error = %e, "task push failed");
                if let Some(job) = self.jobs.get(job) {
                    let out = job.update_task_state(&self.connections, guid, TaskState::Killed);
                    self.enqueue_all(out);
                }
            }
            return;
        }
        let sent = target
            .call_remote(move |p, h| async move { p.send_message(h, message).await })
            .await;
        if let Err(e) = sent {
            tracing::warn!(handle = %target.handle, %kind, error = %e, "message forward failed");
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
