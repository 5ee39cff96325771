use super::*;

#[tokio::test]
async fn channel_link_carries_both_directions() {
    let (mut link, mut peer) = SocketLink::channel();

    link.send_text("hello".to_owned()).expect("send");
    assert_eq!(peer.outgoing.recv().await, Some(Outgoing::Text("hello".to_owned())));

    peer.incoming
        .send(Incoming::Text("world".to_owned()))
        .expect("send");
    assert_eq!(link.recv().await, Some(Incoming::Text("world".to_owned())));
}

#[tokio::test]
async fn close_is_forwarded_to_peer() {
    let (link, mut peer) = SocketLink::channel();
    link.close(CLOSE_NORMAL, "bye");
    assert_eq!(
        peer.outgoing.recv().await,
        Some(Outgoing::Close {
            code: 1000,
            reason: "bye".to_owned()
        })
    );
}

#[tokio::test]
async fn send_after_peer_drop_reports_closed() {
    let (mut link, peer) = SocketLink::channel();
    drop(peer);
    assert_eq!(link.send_text("x".to_owned()), Err(TransportError::Closed));
    assert_eq!(link.recv().await, None);
}

#[tokio::test]
async fn ws_connector_reports_refused_dial() {
    // Port 1 on loopback is reserved and not listening.
    let err = WsConnector
        .connect("ws://127.0.0.1:1/ws")
        .await
        .expect_err("dial should fail");
    assert!(matches!(err, TransportError::Connect(_)));
    assert_eq!(err.error_code(), "E_TRANSPORT_CONNECT");
}
