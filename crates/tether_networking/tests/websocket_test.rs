//! WebSocket transport: reconnection, relay hub routing and host failover.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tether_networking::websocket::protocol::{
    HostAnnouncePayload, PeersListPayload, HANDSHAKE, HOST_ANNOUNCE, PEERS_LIST, SERVER_ID,
};
use tether_networking::{
    ClientState, ConnectFuture, HubConnector, RelayHub, RelayServer, Transport, TransportError,
    TransportResult, WireMessage, WsConfig, WsConnector, WsLink, WsTransport,
};

/// Server side of a scripted connection.
struct ServerEnd {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<TransportResult<String>>,
}

impl ServerEnd {
    fn push<T: serde::Serialize>(&self, kind: &str, payload: &T) {
        let mut msg = WireMessage::with_payload(kind, payload).unwrap();
        msg.sender_id = SERVER_ID.into();
        self.tx.send(Ok(msg.to_json().unwrap())).unwrap();
    }
}

fn link_pair() -> (WsLink, ServerEnd) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        WsLink { outgoing: client_tx, incoming: client_rx },
        ServerEnd { rx: server_rx, tx: server_tx },
    )
}

/// Hands out pre-built links in order, then refuses.
struct ScriptedConnector {
    links: Mutex<VecDeque<WsLink>>,
}

impl ScriptedConnector {
    fn new(links: Vec<WsLink>) -> Arc<Self> {
        Arc::new(Self { links: Mutex::new(links.into()) })
    }
}

impl WsConnector for ScriptedConnector {
    fn connect(&self, _url: &str) -> ConnectFuture {
        let next = self.links.lock().pop_front();
        Box::pin(async move { next.ok_or_else(|| TransportError::Connect("refused".into())) })
    }
}

fn config(player: &str) -> WsConfig {
    WsConfig {
        reconnect_delay_ms: 10,
        ..WsConfig::new("ws://test", "r1", player)
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_reconnects_once_after_close() {
    let (first, mut server1) = link_pair();
    let (second, mut server2) = link_pair();
    let connector = ScriptedConnector::new(vec![first, second]);
    let transport = WsTransport::connect_with(
        WsConfig { max_reconnect_attempts: 1, ..config("alice") },
        connector,
    )
    .unwrap();

    let hello = WireMessage::from_json(&server1.rx.recv().await.unwrap()).unwrap();
    assert_eq!(hello.kind, HANDSHAKE);
    assert_eq!(hello.payload, json!({"playerId": "alice", "roomId": "r1"}));

    let joins = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&joins);
    let _joins = transport.on_peer_join(Arc::new(move |id: &str| sink.lock().push(id.to_owned())));

    server1.push(PEERS_LIST, &PeersListPayload { peers: vec!["bob".into()] });
    server1.push(HOST_ANNOUNCE, &HostAnnouncePayload { host_id: "alice".into() });
    transport.wait_for_ready().await.unwrap();
    eventually("host announce", || transport.is_host()).await;
    assert_eq!(transport.connect_attempts(), 1);

    drop(server1);

    let again = WireMessage::from_json(&server2.rx.recv().await.unwrap()).unwrap();
    assert_eq!(again.kind, HANDSHAKE);
    assert_eq!(transport.state(), ClientState::Reconnecting);
    assert!(!transport.is_host());
    assert!(transport.host_id().is_none());
    assert!(transport.peer_ids().is_empty());
    assert!(matches!(
        transport.send(WireMessage::new("early", json!({})), None),
        Err(TransportError::NotConnected)
    ));

    server2.push(PEERS_LIST, &PeersListPayload { peers: vec!["bob".into(), "carol".into()] });
    transport.wait_for_ready().await.unwrap();
    assert_eq!(transport.connect_attempts(), 2);
    assert_eq!(transport.peer_ids(), vec!["bob".to_owned(), "carol".to_owned()]);
    // Bob survived the outage, so only Carol is announced again.
    eventually("carol joins", || joins.lock().len() == 2).await;
    assert_eq!(*joins.lock(), vec!["bob".to_owned(), "carol".to_owned()]);
}

#[tokio::test]
async fn test_gives_up_after_ceiling() {
    let (first, mut server) = link_pair();
    let connector = ScriptedConnector::new(vec![first]);
    let transport = WsTransport::connect_with(
        WsConfig { max_reconnect_attempts: 1, ..config("alice") },
        connector,
    )
    .unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _sub = transport.on_error(Arc::new(move |err: &TransportError| sink.lock().push(err.clone())));

    server.rx.recv().await.unwrap();
    server.push(PEERS_LIST, &PeersListPayload { peers: vec![] });
    transport.wait_for_ready().await.unwrap();
    drop(server);

    let mut states = transport.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| *s == ClientState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(transport.connect_attempts(), 2);
    assert!(transport.wait_for_ready().await.is_err());
    assert!(matches!(errors.lock().as_slice(), [TransportError::Connect(_)]));
}

#[tokio::test]
async fn test_garbage_frame_goes_to_error_channel() {
    let (first, mut server) = link_pair();
    let transport =
        WsTransport::connect_with(config("alice"), ScriptedConnector::new(vec![first])).unwrap();
    let errors = Arc::new(Mutex::new(0usize));
    let count = Arc::clone(&errors);
    let _sub = transport.on_error(Arc::new(move |_: &TransportError| *count.lock() += 1));
    let messages = Arc::new(Mutex::new(0usize));
    let m = Arc::clone(&messages);
    let _msgs = transport.on_message(Arc::new(move |_: &WireMessage| *m.lock() += 1));

    server.rx.recv().await.unwrap();
    server.tx.send(Ok("{{{ not json".into())).unwrap();
    server.push(PEERS_LIST, &PeersListPayload { peers: vec![] });
    transport.wait_for_ready().await.unwrap();

    assert_eq!(*errors.lock(), 1);
    assert_eq!(*messages.lock(), 0);
}

#[tokio::test]
async fn test_hub_routes_between_clients() {
    let hub = RelayHub::new();
    let connector = Arc::new(HubConnector::new(Arc::clone(&hub)));
    let a = WsTransport::connect_with(config("a"), connector.clone()).unwrap();
    a.wait_for_ready().await.unwrap();
    let b = WsTransport::connect_with(config("b"), connector.clone()).unwrap();
    b.wait_for_ready().await.unwrap();
    let c = WsTransport::connect_with(config("c"), connector).unwrap();
    c.wait_for_ready().await.unwrap();

    eventually("host announcements", || {
        a.is_host() && b.host_id().as_deref() == Some("a") && c.host_id().as_deref() == Some("a")
    })
    .await;
    eventually("peer lists", || a.peer_ids().len() == 2).await;

    let (tx, mut inbox) = mpsc::unbounded_channel();
    let b_tx = tx.clone();
    let _b = b.on_message(Arc::new(move |msg: &WireMessage| {
        let _ = b_tx.send(("b", msg.clone()));
    }));
    let _c = c.on_message(Arc::new(move |msg: &WireMessage| {
        let _ = tx.send(("c", msg.clone()));
    }));

    a.send(WireMessage::new("only_c", json!({})), Some("c")).unwrap();
    a.send(WireMessage::new("everyone", json!({"n": 1})), None).unwrap();

    let mut got = Vec::new();
    for _ in 0..3 {
        let (who, msg) = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.sender_id, "a");
        got.push(format!("{who}:{}", msg.kind));
    }
    got.sort();
    assert_eq!(got, vec!["b:everyone", "c:everyone", "c:only_c"]);
}

#[tokio::test]
async fn test_hub_host_failover() {
    let hub = RelayHub::new();
    let connector = Arc::new(HubConnector::new(Arc::clone(&hub)));
    let a = WsTransport::connect_with(config("a"), connector.clone()).unwrap();
    a.wait_for_ready().await.unwrap();
    let b = WsTransport::connect_with(config("b"), connector).unwrap();
    b.wait_for_ready().await.unwrap();
    eventually("b sees host a", || b.host_id().as_deref() == Some("a")).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let subs = {
        let (o1, o2, o3) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));
        vec![
            b.on_peer_leave(Arc::new(move |id: &str| o1.lock().push(format!("leave:{id}")))),
            b.on_host_disconnect(Arc::new(move |id: &str| o2.lock().push(format!("host_disconnect:{id}")))),
            b.on_host_change(Arc::new(move |id: &str| o3.lock().push(format!("host:{id}")))),
        ]
    };

    a.disconnect();
    eventually("promotion", || b.is_host()).await;

    assert_eq!(*order.lock(), vec!["leave:a", "host_disconnect:a", "host:b"]);
    assert_eq!(hub.peer_count("r1"), 1);
    drop(subs);
}

#[tokio::test]
async fn test_real_socket_round_trip() {
    let server = RelayServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let hub = server.hub();
    tokio::spawn(server.run());

    let url = format!("ws://{addr}");
    let a = WsTransport::connect(WsConfig::new(url.clone(), "net", "a")).unwrap();
    a.wait_for_ready().await.unwrap();
    let b = WsTransport::connect(WsConfig::new(url, "net", "b")).unwrap();
    b.wait_for_ready().await.unwrap();
    eventually("hub registration", || hub.peer_count("net") == 2).await;

    let (tx, mut inbox) = mpsc::unbounded_channel();
    let _sub = b.on_message(Arc::new(move |msg: &WireMessage| {
        let _ = tx.send(msg.clone());
    }));
    a.send(WireMessage::new("hello", json!({"over": "tcp"})), None).unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.kind, "hello");
    assert_eq!(msg.sender_id, "a");
    assert_eq!(msg.payload, json!({"over": "tcp"}));
}

#[test]
fn test_connect_requires_runtime() {
    let err = WsTransport::connect(WsConfig::new("ws://x", "r1", "a")).err().unwrap();
    assert!(matches!(err, TransportError::Connect(_)));
}
