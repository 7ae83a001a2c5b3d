//! End-to-end sessions on the in-process bus.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether::networking::{LocalRegistry, LocalTransport, WireMessage};
use tether::{
    ActionError, GameDefinition, GameEvent, PlayerRoster, Runtime, RuntimeConfig, RuntimeError, Subscription,
    Transport,
};

fn arena() -> GameDefinition {
    GameDefinition::new(|_| json!({ "counter": 0, "log": [] }))
        .with_roster(PlayerRoster::new("players", |index, id| json!({ "name": id, "spawn": index, "hp": 100 })))
        .action("increment", |state, _, _| {
            let counter = state["counter"].as_i64().unwrap_or_default();
            state["counter"] = json!(counter + 1);
            Ok(())
        })
        .action("hit", |state, ctx, input| {
            let target = ctx.target_id.ok_or_else(|| ActionError::invalid_input("hit needs a target"))?;
            let damage = input["damage"].as_i64().ok_or_else(|| ActionError::invalid_input("damage"))?;
            let hp = state["players"][target]["hp"]
                .as_i64()
                .ok_or_else(|| ActionError::rejected(format!("no player {target}")))?;
            state["players"][target]["hp"] = json!(hp - damage);
            let attacker = ctx.player_id.to_owned();
            ctx.emit("hit", json!({ "from": attacker, "to": target, "damage": damage }));
            Ok(())
        })
        .action("roll", |state, ctx, _| {
            let roll = ctx.random.range_i64(1, 6);
            state["log"]
                .as_array_mut()
                .ok_or_else(|| ActionError::rejected("log is not a list"))?
                .push(json!(roll));
            Ok(())
        })
}

struct Peer {
    transport: Arc<LocalTransport>,
    runtime: Runtime,
}

fn join(registry: &Arc<LocalRegistry>, id: &str) -> Peer {
    let transport = Arc::new(LocalTransport::join(registry, "r1", id).unwrap());
    let runtime = Runtime::new(arena(), Arc::clone(&transport) as Arc<dyn Transport>, RuntimeConfig::with_seed(7));
    Peer { transport, runtime }
}

/// Payloads of every `patch` message a transport receives.
fn capture_patches(transport: &LocalTransport) -> (Arc<Mutex<Vec<Value>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = transport.on_message(Arc::new(move |msg: &WireMessage| {
        if msg.kind == "patch" {
            sink.lock().push(msg.payload.clone());
        }
    }));
    (seen, sub)
}

#[test]
fn test_three_peers_converge() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    let b = join(&registry, "b");
    let c = join(&registry, "c");
    assert!(a.runtime.is_host());
    assert_eq!(registry.host_of("r1").as_deref(), Some("a"));

    let (patches, _sub) = capture_patches(&c.transport);
    a.runtime.submit_action("increment", Value::Null, None).unwrap();

    let patches = patches.lock();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0]["patches"], json!([{ "op": "replace", "path": ["counter"], "value": 1 }]));
    assert_eq!(b.runtime.state(), a.runtime.state());
    assert_eq!(c.runtime.state(), a.runtime.state());
    assert_eq!(c.runtime.state()["players"].as_object().unwrap().len(), 3);
}

#[test]
fn test_client_actions_are_run_by_host() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    let b = join(&registry, "b");
    let c = join(&registry, "c");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = c.runtime.on_event(Arc::new(move |event: &GameEvent| sink.lock().push(event.clone())));

    b.runtime.submit_action("hit", json!({ "damage": 30 }), Some("c")).unwrap();

    assert_eq!(a.runtime.state()["players"]["c"]["hp"], 70);
    assert_eq!(c.runtime.state(), a.runtime.state());
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, json!({ "from": "b", "to": "c", "damage": 30 }));
}

#[test]
fn test_rejected_remote_action_is_dropped() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    let b = join(&registry, "b");
    let before = a.runtime.state();

    // Forwarding succeeds; the host refuses and nothing changes.
    b.runtime.submit_action("hit", json!({ "damage": 5 }), Some("nobody")).unwrap();
    b.runtime.submit_action("unknown", Value::Null, None).unwrap();
    assert_eq!(a.runtime.state(), before);
    assert_eq!(b.runtime.state(), before);

    let err = a.runtime.submit_action("hit", json!({}), Some("b")).unwrap_err();
    assert!(matches!(err, RuntimeError::Action { source: ActionError::InvalidInput(_), .. }));
}

#[test]
fn test_leave_cleanup() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    let b = join(&registry, "b");
    let c = join(&registry, "c");

    let leaves = Arc::new(Mutex::new(Vec::new()));
    let subs: Vec<Subscription> = [&a, &c]
        .iter()
        .map(|peer| {
            let sink = Arc::clone(&leaves);
            let who = peer.runtime.player_id().to_owned();
            peer.transport.on_peer_leave(Arc::new(move |id: &str| sink.lock().push(format!("{who}:{id}"))))
        })
        .collect();

    drop(b.runtime);
    b.transport.disconnect();

    let mut leaves = leaves.lock().clone();
    leaves.sort();
    assert_eq!(leaves, vec!["a:b".to_owned(), "c:b".to_owned()]);
    assert_eq!(registry.peer_count("r1"), 2);
    assert!(a.runtime.state()["players"].get("b").is_none());
    assert_eq!(c.runtime.state(), a.runtime.state());
    drop(subs);
}

#[test]
fn test_host_failover() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    let b = join(&registry, "b");
    let c = join(&registry, "c");
    a.runtime.submit_action("increment", Value::Null, None).unwrap();

    drop(a.runtime);
    a.transport.disconnect();

    assert!(b.runtime.is_host());
    assert!(!c.runtime.is_host());
    let state = b.runtime.state();
    assert_eq!(state["counter"], 1);
    assert!(state["players"].get("a").is_none());
    assert_eq!(c.runtime.state(), state);

    c.runtime.submit_action("increment", Value::Null, None).unwrap();
    assert_eq!(b.runtime.state()["counter"], 2);
    assert_eq!(c.runtime.state(), b.runtime.state());
}

#[test]
fn test_late_joiner_gets_roster_slot() {
    let registry = LocalRegistry::new();
    let a = join(&registry, "a");
    a.runtime.submit_action("increment", Value::Null, None).unwrap();

    let d = join(&registry, "d");
    let state = d.runtime.state();
    assert_eq!(state["counter"], 1);
    assert_eq!(state["players"]["d"], json!({ "name": "d", "spawn": 1, "hp": 100 }));
    assert_eq!(state, a.runtime.state());
}

#[test]
fn test_seeded_random_is_reproducible() {
    let rolls = |seed: u64| {
        let registry = LocalRegistry::new();
        let transport = Arc::new(LocalTransport::join(&registry, "solo", "a").unwrap());
        let runtime = Runtime::new(arena(), transport, RuntimeConfig::with_seed(seed));
        for _ in 0..5 {
            runtime.submit_action("roll", Value::Null, None).unwrap();
        }
        runtime.state()["log"].clone()
    };
    assert_eq!(rolls(42), rolls(42));
    assert_eq!(rolls(42).as_array().unwrap().len(), 5);
}
