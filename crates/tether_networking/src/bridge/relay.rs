//! # Bridge Relay
//!
//! Page-level broker between sandboxed frames.
//!
//! ```text
//!   window 1 ──post──►┐                 ┌──► inbox 1
//!   window 2 ──post──►┤   BridgeRelay   ├──► inbox 2
//!   window 3 ──post──►┘  rooms, hosts   └──► inbox 3
//! ```
//!
//! Senders are resolved by window handle, never by the ids a frame claims.
//! Frames produced while the tables are locked are queued in an outbox and
//! posted after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::frames::{
    BridgeFrame, BridgeKind, DeliverPayload, HostAnnouncePayload, HostDisconnectPayload,
    PeerJoinPayload, PeerLeavePayload, SendPayload, WelcomePayload,
};

/// Opaque handle of an attached window.
pub type WindowId = u64;

/// Frames waiting to be posted once the tables are unlocked.
type Outbox = Vec<(WindowId, BridgeFrame)>;

struct BridgeMember {
    player_id: String,
    window: WindowId,
}

#[derive(Default)]
struct BridgeRoom {
    /// Members in registration order.
    members: Vec<BridgeMember>,
    host: Option<String>,
}

#[derive(Default)]
struct RelayTables {
    rooms: HashMap<String, BridgeRoom>,
    /// Window → (room, player).
    memberships: HashMap<WindowId, (String, String)>,
}

/// Brokers bridge frames between attached windows.
#[derive(Default)]
pub struct BridgeRelay {
    next_window: AtomicU64,
    windows: Mutex<HashMap<WindowId, Sender<Value>>>,
    tables: Mutex<RelayTables>,
}

impl BridgeRelay {
    /// Creates a relay with no windows.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a new window and returns its handle.
    #[must_use]
    pub fn attach(self: &Arc<Self>) -> BridgeWindow {
        let id = self.next_window.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, inbox) = unbounded();
        self.windows.lock().insert(id, tx);
        tracing::debug!(window = id, "bridge window attached");
        BridgeWindow { id, relay: Arc::clone(self), inbox }
    }

    /// Detaches a window. A registered window departs its room first.
    pub fn detach(&self, window: WindowId) {
        let outbox = self.depart(window);
        self.flush(outbox);
        if self.windows.lock().remove(&window).is_some() {
            tracing::debug!(window, "bridge window detached");
        }
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.tables.lock().rooms.len()
    }

    /// Number of registered peers in a room.
    #[must_use]
    pub fn peer_count(&self, room_id: &str) -> usize {
        self.tables.lock().rooms.get(room_id).map_or(0, |room| room.members.len())
    }

    /// Current host of a room.
    #[must_use]
    pub fn host_of(&self, room_id: &str) -> Option<String> {
        self.tables.lock().rooms.get(room_id).and_then(|room| room.host.clone())
    }

    /// Handles a value posted by `source`.
    ///
    /// Unknown sources and malformed frames are logged and dropped.
    pub fn receive(&self, source: WindowId, data: Value) {
        if !self.windows.lock().contains_key(&source) {
            tracing::warn!(window = source, "bridge frame from unknown window dropped");
            return;
        }
        let frame = match BridgeFrame::from_value(data) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(window = source, error = %err, "malformed bridge frame dropped");
                return;
            }
        };

        let outbox = match frame.kind {
            BridgeKind::Register => self.register(source, &frame),
            BridgeKind::Unregister => self.depart(source),
            BridgeKind::Send => self.route(source, &frame),
            kind => {
                tracing::warn!(window = source, ?kind, "relay-bound frame has outbound kind");
                return;
            }
        };
        self.flush(outbox);
    }

    fn register(&self, source: WindowId, frame: &BridgeFrame) -> Outbox {
        let mut outbox = Outbox::new();
        let (Some(room_id), Some(player_id)) = (frame.room_id.as_deref(), frame.player_id.as_deref()) else {
            tracing::warn!(window = source, "bridge register without ids dropped");
            return outbox;
        };
        if room_id.is_empty() || player_id.is_empty() {
            tracing::warn!(window = source, "bridge register with empty ids dropped");
            return outbox;
        }

        let mut tables = self.tables.lock();
        if tables.memberships.contains_key(&source) {
            tracing::warn!(window = source, "bridge window registered twice");
            return outbox;
        }
        let room = tables.rooms.entry(room_id.to_owned()).or_default();
        if room.members.iter().any(|m| m.player_id == player_id) {
            tracing::warn!(window = source, room = room_id, player = player_id, "duplicate bridge player dropped");
            return outbox;
        }

        let peers: Vec<String> = room.members.iter().map(|m| m.player_id.clone()).collect();
        let others: Vec<WindowId> = room.members.iter().map(|m| m.window).collect();
        room.members.push(BridgeMember { player_id: player_id.to_owned(), window: source });
        let host_id = room.host.get_or_insert_with(|| player_id.to_owned()).clone();
        tables
            .memberships
            .insert(source, (room_id.to_owned(), player_id.to_owned()));
        drop(tables);

        tracing::info!(room = room_id, player = player_id, host = %host_id, "bridge peer registered");

        push(
            &mut outbox,
            source,
            BridgeKind::Welcome,
            &WelcomePayload { is_host: host_id == player_id, host_id, peers },
        );
        for window in others {
            push(&mut outbox, window, BridgeKind::PeerJoin, &PeerJoinPayload { peer_id: player_id.to_owned() });
        }
        outbox
    }

    fn depart(&self, source: WindowId) -> Outbox {
        let mut outbox = Outbox::new();
        let mut tables = self.tables.lock();
        let Some((room_id, player_id)) = tables.memberships.remove(&source) else {
            return outbox;
        };
        let Some(room) = tables.rooms.get_mut(&room_id) else {
            return outbox;
        };
        room.members.retain(|m| m.window != source);

        let was_host = room.host.as_deref() == Some(player_id.as_str());
        if was_host {
            room.host = room.members.first().map(|m| m.player_id.clone());
        }
        let survivors: Vec<WindowId> = room.members.iter().map(|m| m.window).collect();
        let new_host = room.host.clone();
        if survivors.is_empty() {
            tables.rooms.remove(&room_id);
        }
        drop(tables);

        tracing::info!(room = %room_id, player = %player_id, was_host, "bridge peer departed");

        for &window in &survivors {
            push(
                &mut outbox,
                window,
                BridgeKind::PeerLeave,
                &PeerLeavePayload { peer_id: player_id.clone(), was_host },
            );
        }
        if was_host {
            for &window in &survivors {
                push(
                    &mut outbox,
                    window,
                    BridgeKind::HostDisconnect,
                    &HostDisconnectPayload { was_host: player_id.clone() },
                );
            }
            if let Some(host_id) = new_host {
                tracing::info!(room = %room_id, host = %host_id, "bridge host promoted");
                for &window in &survivors {
                    push(
                        &mut outbox,
                        window,
                        BridgeKind::HostAnnounce,
                        &HostAnnouncePayload { host_id: host_id.clone() },
                    );
                }
            }
        }
        outbox
    }

    fn route(&self, source: WindowId, frame: &BridgeFrame) -> Outbox {
        let mut outbox = Outbox::new();
        let send: SendPayload = match frame.payload_as() {
            Ok(send) => send,
            Err(err) => {
                tracing::warn!(window = source, error = %err, "malformed bridge send dropped");
                return outbox;
            }
        };

        let tables = self.tables.lock();
        let Some((room_id, player_id)) = tables.memberships.get(&source) else {
            tracing::warn!(window = source, "bridge send from unregistered window dropped");
            return outbox;
        };
        let Some(room) = tables.rooms.get(room_id) else {
            return outbox;
        };

        let mut message = send.message;
        message.sender_id.clone_from(player_id);
        message.target_id.clone_from(&send.target_id);

        let recipients: Vec<WindowId> = match send.target_id.as_deref() {
            Some(target) => {
                let found = room.members.iter().find(|m| m.player_id == target);
                if found.is_none() {
                    tracing::warn!(room = %room_id, to = target, "bridge target not in room");
                }
                found.map(|m| m.window).into_iter().collect()
            }
            None => room
                .members
                .iter()
                .filter(|m| m.window != source)
                .map(|m| m.window)
                .collect(),
        };
        drop(tables);

        let deliver = DeliverPayload { message };
        for window in recipients {
            push(&mut outbox, window, BridgeKind::Deliver, &deliver);
        }
        outbox
    }

    fn flush(&self, outbox: Outbox) {
        for (window, frame) in outbox {
            let value = match frame.to_value() {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(window, error = %err, "bridge frame encoding failed");
                    continue;
                }
            };
            let tx = self.windows.lock().get(&window).cloned();
            if let Some(tx) = tx {
                // Receiver gone means the window is being torn down.
                let _ = tx.send(value);
            }
        }
    }
}

fn push<T: Serialize>(outbox: &mut Outbox, window: WindowId, kind: BridgeKind, payload: &T) {
    match BridgeFrame::with_payload(kind, payload) {
        Ok(frame) => outbox.push((window, frame)),
        Err(err) => tracing::warn!(window, ?kind, error = %err, "bridge payload encoding failed"),
    }
}

/// A window attached to a [`BridgeRelay`].
///
/// Posts go to the relay; frames from the relay wait in a FIFO inbox.
/// Dropping the window detaches it.
pub struct BridgeWindow {
    id: WindowId,
    relay: Arc<BridgeRelay>,
    inbox: Receiver<Value>,
}

impl BridgeWindow {
    /// This window's handle.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> WindowId {
        self.id
    }

    /// Posts a value to the relay.
    pub fn post(&self, data: Value) {
        self.relay.receive(self.id, data);
    }

    /// Takes the oldest undelivered frame, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<Value> {
        self.inbox.try_recv().ok()
    }

    /// Number of frames waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Drop for BridgeWindow {
    fn drop(&mut self) {
        self.relay.detach(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn register(window: &BridgeWindow, room: &str, player: &str) {
        let frame = BridgeFrame::new(BridgeKind::Register, json!({})).addressed(room, player);
        window.post(frame.to_value().unwrap());
    }

    fn kinds(window: &BridgeWindow) -> Vec<BridgeKind> {
        let mut out = Vec::new();
        while let Some(value) = window.try_recv() {
            out.push(BridgeFrame::from_value(value).unwrap().kind);
        }
        out
    }

    #[test]
    fn test_welcome_and_join() {
        let relay = BridgeRelay::new();
        let a = relay.attach();
        let b = relay.attach();
        register(&a, "r1", "a");
        register(&b, "r1", "b");

        assert_eq!(kinds(&a), vec![BridgeKind::Welcome, BridgeKind::PeerJoin]);
        let welcome = BridgeFrame::from_value(b.try_recv().unwrap()).unwrap();
        let payload: WelcomePayload = welcome.payload_as().unwrap();
        assert!(!payload.is_host);
        assert_eq!(payload.host_id, "a");
        assert_eq!(payload.peers, vec!["a".to_owned()]);
    }

    #[test]
    fn test_host_departure_order() {
        let relay = BridgeRelay::new();
        let a = relay.attach();
        let b = relay.attach();
        register(&a, "r1", "a");
        register(&b, "r1", "b");
        kinds(&b);

        drop(a);
        assert_eq!(
            kinds(&b),
            vec![BridgeKind::PeerLeave, BridgeKind::HostDisconnect, BridgeKind::HostAnnounce]
        );
        assert_eq!(relay.host_of("r1").as_deref(), Some("b"));
    }

    #[test]
    fn test_unknown_source_and_garbage_dropped() {
        let relay = BridgeRelay::new();
        let a = relay.attach();
        relay.receive(999, json!({"type": "BRIDGE_REGISTER", "roomId": "r1", "playerId": "x"}));
        a.post(json!({"hello": "world"}));
        assert_eq!(relay.room_count(), 0);
        assert_eq!(a.pending(), 0);
    }
}
