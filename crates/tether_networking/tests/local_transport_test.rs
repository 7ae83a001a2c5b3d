//! In-process bus: election, routing and departure ordering.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tether_networking::{LocalRegistry, LocalTransport, Subscription, Transport, WireMessage};

/// Everything one transport observed, in order.
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl Recorder {
    fn attach(transport: &LocalTransport) -> (Arc<Self>, Vec<Subscription>) {
        let recorder = Arc::new(Self::default());
        let subs = vec![
            {
                let r = Arc::clone(&recorder);
                transport.on_message(Arc::new(move |msg: &WireMessage| {
                    r.log.lock().push(format!("msg:{}:{}", msg.kind, msg.sender_id));
                }))
            },
            {
                let r = Arc::clone(&recorder);
                transport.on_peer_join(Arc::new(move |id: &str| r.log.lock().push(format!("join:{id}"))))
            },
            {
                let r = Arc::clone(&recorder);
                transport.on_peer_leave(Arc::new(move |id: &str| r.log.lock().push(format!("leave:{id}"))))
            },
            {
                let r = Arc::clone(&recorder);
                transport.on_host_disconnect(Arc::new(move |id: &str| {
                    r.log.lock().push(format!("host_disconnect:{id}"));
                }))
            },
            {
                let r = Arc::clone(&recorder);
                transport.on_host_change(Arc::new(move |id: &str| r.log.lock().push(format!("host:{id}"))))
            },
        ];
        (recorder, subs)
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

#[test]
fn test_host_election_is_registration_order() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let c = LocalTransport::join(&registry, "r1", "c").unwrap();

    for t in [&a, &b, &c] {
        assert_eq!(t.host_id().as_deref(), Some("a"));
    }
    let peers = registry.peers("r1");
    assert_eq!(peers.iter().filter(|p| p.is_host).count(), 1);
    assert_eq!(peers[0].player_id, "a");
}

#[test]
fn test_pairwise_join_notifications() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let (a_log, _a_subs) = Recorder::attach(&a);

    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    assert_eq!(a_log.take(), vec!["join:b"]);
    assert_eq!(b.peer_ids(), vec!["a".to_owned()]);
}

#[test]
fn test_broadcast_reaches_every_other_peer_once() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let c = LocalTransport::join(&registry, "r1", "c").unwrap();
    let (a_log, _a) = Recorder::attach(&a);
    let (b_log, _b) = Recorder::attach(&b);
    let (c_log, _c) = Recorder::attach(&c);

    a.send(WireMessage::new("ping", json!({"n": 1})), None).unwrap();

    assert!(a_log.take().is_empty());
    assert_eq!(b_log.take(), vec!["msg:ping:a"]);
    assert_eq!(c_log.take(), vec!["msg:ping:a"]);
}

#[test]
fn test_unicast_reaches_only_target() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let c = LocalTransport::join(&registry, "r1", "c").unwrap();
    let (b_log, _b) = Recorder::attach(&b);
    let (c_log, _c) = Recorder::attach(&c);

    a.send(WireMessage::new("secret", json!({})), Some("c")).unwrap();

    assert!(b_log.take().is_empty());
    assert_eq!(c_log.take(), vec!["msg:secret:a"]);
}

#[test]
fn test_send_order_is_preserved() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = b.on_message(Arc::new(move |msg: &WireMessage| {
        sink.lock().push(msg.payload["n"].as_i64().unwrap_or(-1));
    }));

    for n in 0..50 {
        a.send(WireMessage::new("seq", json!({ "n": n })), None).unwrap();
    }
    assert_eq!(*seen.lock(), (0..50).collect::<Vec<i64>>());
}

#[test]
fn test_host_leave_order() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let c = LocalTransport::join(&registry, "r1", "c").unwrap();
    let (b_log, _b) = Recorder::attach(&b);
    let (c_log, _c) = Recorder::attach(&c);

    a.disconnect();

    let expected = vec!["leave:a", "host_disconnect:a", "host:b"];
    assert_eq!(b_log.take(), expected);
    assert_eq!(c_log.take(), expected);
    assert!(b.is_host());
    assert_eq!(c.host_id().as_deref(), Some("b"));
}

#[test]
fn test_leave_cleanup() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let c = LocalTransport::join(&registry, "r1", "c").unwrap();
    let (a_log, _a) = Recorder::attach(&a);
    let (c_log, _c) = Recorder::attach(&c);

    b.disconnect();

    assert_eq!(a_log.take(), vec!["leave:b"]);
    assert_eq!(c_log.take(), vec!["leave:b"]);
    assert_eq!(registry.peer_count("r1"), 2);
    assert!(a.is_host());
}

#[test]
fn test_unsubscribed_handler_is_silent() {
    let registry = LocalRegistry::new();
    let a = LocalTransport::join(&registry, "r1", "a").unwrap();
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();
    let (b_log, subs) = Recorder::attach(&b);
    for sub in subs {
        sub.unsubscribe();
    }

    a.send(WireMessage::new("ping", json!({})), None).unwrap();
    assert!(b_log.take().is_empty());
}

#[test]
fn test_handler_may_send_from_callback() {
    let registry = LocalRegistry::new();
    let a = Arc::new(LocalTransport::join(&registry, "r1", "a").unwrap());
    let b = LocalTransport::join(&registry, "r1", "b").unwrap();

    let echo = Arc::downgrade(&a);
    let _sub = a.on_message(Arc::new(move |msg: &WireMessage| {
        if let Some(echo) = echo.upgrade().filter(|_| msg.kind == "ping") {
            let _ = echo.send(WireMessage::new("pong", json!({})), Some(&msg.sender_id));
        }
    }));
    let (b_log, _b) = Recorder::attach(&b);

    b.send(WireMessage::new("ping", json!({})), None).unwrap();
    assert_eq!(b_log.take(), vec!["msg:pong:a"]);
    assert_eq!(Arc::strong_count(&a), 1);
}
