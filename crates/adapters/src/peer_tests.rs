// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::net::TcpListener;

/// Accept one call, check the envelope, answer with `response`
async fn serve_once(response: PeerResponse) -> (String, tokio::task::JoinHandle<PeerEnvelope>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let envelope: PeerEnvelope =
            read_frame(&mut reader, Duration::from_secs(5)).await.unwrap();
        write_frame(&mut writer, &response, Duration::from_secs(5)).await.unwrap();
        envelope
    });
    (addr, task)
}

fn peer(addr: String) -> TcpPeer {
    TcpPeer::new(addr, Some("secret".to_string()), Duration::from_secs(5))
}

#[tokio::test]
async fn call_wraps_request_in_envelope() {
    let (addr, server) = serve_once(PeerResponse::Flag { value: true }).await;

    let alive = peer(addr).test_connection(Handle(42)).await.unwrap();

    assert!(alive);
    let envelope = server.await.unwrap();
    assert_eq!(envelope.version, PROTOCOL_VERSION);
    assert_eq!(envelope.token.as_deref(), Some("secret"));
    assert_eq!(envelope.request, PeerRequest::TestConnection { handle: Handle(42) });
}

#[tokio::test]
async fn open_remote_connection_refusal_is_none() {
    let (addr, _server) = serve_once(PeerResponse::Opened { handle: None }).await;
    let opened = peer(addr).open_remote_connection("boss", Handle(7), false, 0).await.unwrap();
    assert_eq!(opened, None);
}

#[tokio::test]
async fn open_remote_connection_accepts() {
    let (addr, server) = serve_once(PeerResponse::Opened { handle: Some(Handle(7)) }).await;
    let opened = peer(addr).open_remote_connection("boss", Handle(7), true, 123).await.unwrap();
    assert_eq!(opened, Some(Handle(7)));
    assert_eq!(
        server.await.unwrap().request,
        PeerRequest::OpenRemoteConnection {
            requesting_agent: "boss".to_string(),
            handle: Handle(7),
            assigned: true,
            assigned_time: 123,
        }
    );
}

#[tokio::test]
async fn error_response_becomes_remote_error() {
    let (addr, _server) =
        serve_once(PeerResponse::Error { error: AgentError::ConnectionNotFound }).await;
    let err = peer(addr).close_connection(Handle(1)).await.unwrap_err();
    assert!(matches!(err, PeerError::Remote(AgentError::ConnectionNotFound)));
    assert_eq!(err.to_agent_error(), AgentError::ConnectionNotFound);
}

#[tokio::test]
async fn wrong_response_shape_is_unexpected() {
    let (addr, _server) = serve_once(PeerResponse::Ok).await;
    let err = peer(addr).validate_channel(Handle(1), "a.bin", "00").await.unwrap_err();
    assert!(matches!(err, PeerError::Unexpected(_)));
}

#[tokio::test]
async fn unreachable_peer_maps_to_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let peer = peer(addr);
    assert!(!peer.ping_host().await);
    let err = peer.send_message(Handle(1), Message::new(swarm_core::MessageBody::Ping)).await;
    assert_eq!(err.unwrap_err().to_agent_error(), AgentError::ConnectionDisconnected);
}

#[yare::parameterized(
    open     = { PeerRequest::OpenRemoteConnection {
                     requesting_agent: String::new(), handle: Handle(1),
                     assigned: false, assigned_time: 0 }, 20 },
    transfer = { PeerRequest::RequestChannel {
                     handle: Handle(1), name: "a".into(), job: None }, 60 },
    other    = { PeerRequest::CloseJob { handle: Handle(1) }, 10 },
)]
fn timeout_depends_on_call(request: PeerRequest, secs: u64) {
    let peer = TcpPeer::new("127.0.0.1:1", None, Duration::from_secs(10));
    assert_eq!(peer.timeout_for(&request), Duration::from_secs(secs));
}

#[test]
fn connector_uses_advertised_address() {
    let connector = TcpConnector::new(None, Duration::from_secs(1));
    let info = AgentInfo { ip: "10.0.0.5".to_string(), port: 9001, ..Default::default() };
    assert_eq!(connector.connect(&info).address(), "10.0.0.5:9001");
}
