//! Runtimes talking through the bridge relay, driven by explicit pumping.

use std::sync::Arc;

use serde_json::{json, Value};
use tether::networking::{BridgeRelay, BridgeTransport};
use tether::{GameDefinition, PlayerRoster, Runtime, RuntimeConfig, Transport};

fn game() -> GameDefinition {
    GameDefinition::new(|_| json!({ "score": 0 }))
        .with_roster(PlayerRoster::new("players", |index, _| json!({ "seat": index })))
        .action("score", |state, _, input| {
            let points = input["points"].as_i64().unwrap_or(1);
            state["score"] = json!(state["score"].as_i64().unwrap_or_default() + points);
            Ok(())
        })
}

struct Frame {
    transport: Arc<BridgeTransport>,
    runtime: Runtime,
}

fn open(relay: &Arc<BridgeRelay>, player: &str) -> Frame {
    let transport = Arc::new(BridgeTransport::register(relay.attach(), "r1", player).unwrap());
    transport.pump();
    let runtime = Runtime::new(game(), Arc::clone(&transport) as Arc<dyn Transport>, RuntimeConfig::default());
    Frame { transport, runtime }
}

/// Pumps every frame until no inbox has anything left.
fn settle(frames: &[&Frame]) {
    for _ in 0..32 {
        let processed: usize = frames.iter().map(|frame| frame.transport.pump()).sum();
        if processed == 0 {
            return;
        }
    }
    panic!("bridge did not settle");
}

#[test]
fn test_clients_converge_through_relay() {
    let relay = BridgeRelay::new();
    let a = open(&relay, "a");
    let b = open(&relay, "b");
    let c = open(&relay, "c");
    settle(&[&a, &b, &c]);

    assert!(a.runtime.is_host());
    assert_eq!(b.runtime.state(), a.runtime.state());
    assert_eq!(c.runtime.state()["players"], json!({ "a": { "seat": 0 }, "b": { "seat": 1 }, "c": { "seat": 2 } }));

    b.runtime.submit_action("score", json!({ "points": 3 }), None).unwrap();
    settle(&[&a, &b, &c]);
    a.runtime.submit_action("score", Value::Null, None).unwrap();
    settle(&[&a, &b, &c]);

    assert_eq!(a.runtime.state()["score"], 4);
    assert_eq!(b.runtime.state(), a.runtime.state());
    assert_eq!(c.runtime.state(), a.runtime.state());
}

#[test]
fn test_host_departure_promotes_next_frame() {
    let relay = BridgeRelay::new();
    let a = open(&relay, "a");
    let b = open(&relay, "b");
    let c = open(&relay, "c");
    settle(&[&a, &b, &c]);
    a.runtime.submit_action("score", json!({ "points": 5 }), None).unwrap();
    settle(&[&a, &b, &c]);

    let Frame { transport, runtime } = a;
    drop(runtime);
    transport.disconnect();
    settle(&[&b, &c]);

    assert!(b.runtime.is_host());
    assert_eq!(relay.host_of("r1").as_deref(), Some("b"));
    let state = b.runtime.state();
    assert_eq!(state["score"], 5);
    assert!(state["players"].get("a").is_none());
    assert_eq!(c.runtime.state(), state);

    c.runtime.submit_action("score", Value::Null, None).unwrap();
    settle(&[&b, &c]);
    assert_eq!(b.runtime.state()["score"], 6);
    assert_eq!(c.runtime.state(), b.runtime.state());
}
