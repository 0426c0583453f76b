// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{agent_info, PeerBehaviour, RecordingPeer};
use swarm_core::MessageBody;

fn remote(handle: i32, peer: Arc<RecordingPeer>) -> Arc<Connection> {
    Arc::new(Connection::remote(Handle(handle), agent_info("beta"), peer, Instant::now()))
}

#[tokio::test]
async fn mailbox_wait_returns_once_a_message_arrives() {
    let mailbox = Mailbox::default();
    assert!(!mailbox.wait(Duration::from_millis(10)).await);
    mailbox.push(Message::new(MessageBody::Ping));
    assert!(mailbox.wait(Duration::from_millis(10)).await);
    assert_eq!(mailbox.len(), 1);
    assert!(mailbox.pop().is_some());
    assert!(mailbox.is_empty());
}

#[tokio::test]
async fn mailbox_signal_wakes_without_a_message() {
    let mailbox = Arc::new(Mailbox::default());
    let waiter = {
        let mailbox = mailbox.clone();
        tokio::spawn(async move { mailbox.wait(Duration::from_secs(5)).await })
    };
    mailbox.signal();
    assert!(waiter.await.unwrap());
    assert!(mailbox.pop().is_none());
}

#[tokio::test]
async fn mailbox_pop_keeps_permits_in_step() {
    let mailbox = Mailbox::default();
    mailbox.push(Message::new(MessageBody::Ping));
    mailbox.push(Message::new(MessageBody::Quit));
    assert!(matches!(mailbox.pop().map(|m| m.body), Some(MessageBody::Ping)));
    assert!(matches!(mailbox.pop().map(|m| m.body), Some(MessageBody::Quit)));
    // Both permits were consumed by the pops
    assert!(!mailbox.wait(Duration::from_millis(10)).await);
}

#[test]
fn mark_disconnected_keeps_the_first_time() {
    let conn = Connection::local(Handle(1), 10, Instant::now());
    let first = Instant::now();
    conn.mark_disconnected(first);
    conn.mark_disconnected(first + Duration::from_secs(3));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(conn.lock().disconnected_at, Some(first));
}

#[test]
fn machine_name_depends_on_the_endpoint() {
    let local = Connection::local(Handle(1), 10, Instant::now());
    let far = remote(2, RecordingPeer::new());
    assert_eq!(local.machine_name("alpha"), "alpha");
    assert_eq!(far.machine_name("alpha"), "beta");
    assert_eq!(local.peer_label(), "10");
    assert_eq!(far.kind(), ConnectionKind::Remote);
}

#[test]
fn aliases_resolve_and_leave_with_their_connection() {
    let table = ConnectionTable::new();
    let conn = remote(5, RecordingPeer::new());
    table.insert(conn.clone());

    assert!(table.add_alias(Handle(77), &conn));
    assert!(!table.add_alias(Handle(5), &conn), "existing key");
    assert_eq!(table.get(Handle(77)).map(|c| c.handle), Some(Handle(5)));
    assert_eq!(table.len(), 1);
    assert_eq!(table.all().len(), 1);

    table.remove(Handle(5));
    assert!(table.get(Handle(77)).is_none());
    assert!(table.is_empty());
}

#[test]
fn local_connections_take_no_aliases() {
    let table = ConnectionTable::new();
    let conn = Arc::new(Connection::local(Handle(1), 10, Instant::now()));
    table.insert(conn.clone());
    assert!(!table.add_alias(Handle(2), &conn));
    assert!(table.get(Handle(2)).is_none());
}

#[test]
fn lookups_by_process_and_pending() {
    let table = ConnectionTable::new();
    table.insert(Arc::new(Connection::local(Handle(1), 10, Instant::now())));
    table.insert(Arc::new(Connection::local(Handle(2), 20, Instant::now())));
    assert_eq!(table.local_for_process(20).map(|c| c.handle), Some(Handle(2)));
    assert!(table.local_for_process(30).is_none());

    let pending = remote(9, RecordingPeer::new());
    table.add_pending(pending);
    assert!(table.is_pending(Handle(9)));
    assert!(table.contains(Handle(9)));
    assert!(table.get(Handle(9)).is_none());
    assert!(table.take_pending(Handle(9)).is_some());
    assert!(!table.contains(Handle(9)));
    assert_eq!(table.require(Handle(9)).err(), Some(AgentError::ConnectionNotFound));
}

#[tokio::test]
async fn call_remote_passes_peer_errors_through() {
    let peer = RecordingPeer::with(PeerBehaviour::Refuse(AgentError::JobNotFound));
    let conn = remote(3, peer.clone());
    let result = conn.call_remote(|p, h| async move { p.close_job(h).await }).await;
    assert_eq!(result, Err(AgentError::JobNotFound));
    assert!(!conn.is_dropped());
    let calls = peer.calls();
    assert!(matches!(
        calls[0],
        swarm_wire::PeerRequest::CloseJob { handle } if handle == Handle(3)
    ));
}

#[tokio::test]
async fn transport_failure_drops_the_connection() {
    let peer = RecordingPeer::with(PeerBehaviour::Unreachable);
    let conn = remote(3, peer.clone());
    let result = conn.call_remote(|p, h| async move { p.close_job(h).await }).await;
    assert_eq!(result, Err(AgentError::ConnectionDisconnected));
    assert!(conn.is_dropped());

    // Later calls fail fast without reaching the peer
    peer.set_behaviour(PeerBehaviour::Accept);
    let result = conn.call_remote(|p, h| async move { p.close_job(h).await }).await;
    assert_eq!(result, Err(AgentError::ConnectionDisconnected));
    assert_eq!(peer.calls().len(), 1);
}

#[tokio::test]
async fn dropped_signal_interrupts_a_hung_call() {
    let conn = remote(3, RecordingPeer::with(PeerBehaviour::Hang));
    let call = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.call_remote(|p, h| async move { p.close_job(h).await }).await
        })
    };
    tokio::task::yield_now().await;
    conn.signal_dropped();
    assert_eq!(call.await.unwrap(), Err(AgentError::ConnectionDisconnected));
}

#[tokio::test]
async fn call_remote_rejects_local_connections() {
    let conn = Connection::local(Handle(1), 10, Instant::now());
    let result = conn.call_remote(|p, h| async move { p.close_job(h).await }).await;
    assert!(matches!(result, Err(AgentError::InvalidArgument(_))));
}
