//! # Relay Server
//!
//! Room bookkeeping and message routing for WebSocket clients.
//!
//! ## Session Flow
//!
//! ```text
//! client                         hub
//!   │ handshake {playerId, roomId} │
//!   │ ───────────────────────────► │ register (first member = host)
//!   │ ◄─────────────────────────── │ peers_list {peers}
//!   │ ◄─────────────────────────── │ host_announce {hostId}
//!   │                              │ ──► others: player_join {peerId}
//!   │ app frame (targetId?)        │
//!   │ ───────────────────────────► │ stamp senderId, route
//!   │ close                        │ ──► others: player_leave {peerId}
//!   │                              │ ──► others: host_announce (if host left)
//! ```
//!
//! A second handshake for a player id that is already present takes over
//! the old member slot. The stale connection's eventual close is ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use super::connector::{spawn_pumps, WsLink};
use super::protocol::{
    HandshakePayload, HostAnnouncePayload, PeerPayload, PeersListPayload, HANDSHAKE,
    HOST_ANNOUNCE, PEERS_LIST, PLAYER_JOIN, PLAYER_LEAVE, SERVER_ID,
};
use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;

/// One connected client.
struct HubMember {
    /// Player id.
    player_id: String,
    /// Connection generation. Changes on takeover.
    session: u64,
    /// Frames to this client.
    tx: mpsc::UnboundedSender<String>,
}

/// Members in registration order plus the current host.
#[derive(Default)]
struct HubRoom {
    members: Vec<HubMember>,
    host: Option<String>,
}

impl HubRoom {
    fn position(&self, player_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m.player_id == player_id)
    }

    fn broadcast_except(&self, player_id: &str, frame: &str) {
        for member in self.members.iter().filter(|m| m.player_id != player_id) {
            // A closed receiver means that member's session is ending.
            let _ = member.tx.send(frame.to_owned());
        }
    }
}

/// Server-side room registry.
///
/// Sends go to unbounded per-connection channels and never block, so
/// routing happens under the room lock.
#[derive(Default)]
pub struct RelayHub {
    rooms: Mutex<HashMap<String, HubRoom>>,
    next_session: AtomicU64,
}

impl RelayHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Number of members in a room.
    #[must_use]
    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.lock().get(room_id).map_or(0, |room| room.members.len())
    }

    /// Current host of a room.
    #[must_use]
    pub fn host_of(&self, room_id: &str) -> Option<String> {
        self.rooms.lock().get(room_id).and_then(|room| room.host.clone())
    }

    /// Registers a connection and returns its session id.
    pub fn join(&self, room_id: &str, player_id: &str, tx: mpsc::UnboundedSender<String>) -> u64 {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(room_id.to_owned()).or_default();

        let takeover = if let Some(index) = room.position(player_id) {
            let member = &mut room.members[index];
            member.session = session;
            member.tx = tx.clone();
            true
        } else {
            room.members.push(HubMember { player_id: player_id.to_owned(), session, tx: tx.clone() });
            false
        };
        if room.host.is_none() {
            room.host = Some(player_id.to_owned());
        }

        let peers = room
            .members
            .iter()
            .filter(|m| m.player_id != player_id)
            .map(|m| m.player_id.clone())
            .collect();
        let host_id = room.host.clone().unwrap_or_default();

        if let Some(frame) = server_frame(PEERS_LIST, &PeersListPayload { peers }) {
            let _ = tx.send(frame);
        }
        if let Some(frame) = server_frame(HOST_ANNOUNCE, &HostAnnouncePayload { host_id: host_id.clone() }) {
            let _ = tx.send(frame);
        }
        if !takeover {
            if let Some(frame) = server_frame(PLAYER_JOIN, &PeerPayload { peer_id: player_id.to_owned() }) {
                room.broadcast_except(player_id, &frame);
            }
        }

        tracing::info!(room = room_id, player = player_id, host = %host_id, takeover, "relay member joined");
        session
    }

    /// Routes an application frame from `player_id`.
    ///
    /// `senderId` is overwritten. Frames for an unknown target are dropped.
    pub fn relay(&self, room_id: &str, player_id: &str, mut message: WireMessage) {
        message.sender_id = player_id.to_owned();
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "relay could not encode frame");
                return;
            }
        };

        let rooms = self.rooms.lock();
        let Some(room) = rooms.get(room_id) else {
            return;
        };
        match message.target_id.as_deref() {
            Some(target) => match room.position(target) {
                Some(index) => {
                    let _ = room.members[index].tx.send(frame);
                }
                None => {
                    tracing::warn!(room = room_id, from = player_id, to = target, "relay target not in room");
                }
            },
            None => room.broadcast_except(player_id, &frame),
        }
    }

    /// Removes a connection if `session` still owns the member slot.
    ///
    /// Survivors get `player_leave`, then `host_announce` when the host left.
    pub fn leave(&self, room_id: &str, player_id: &str, session: u64) {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        let Some(index) = room.position(player_id) else {
            return;
        };
        if room.members[index].session != session {
            return;
        }
        room.members.remove(index);

        if let Some(frame) = server_frame(PLAYER_LEAVE, &PeerPayload { peer_id: player_id.to_owned() }) {
            room.broadcast_except(player_id, &frame);
        }

        if room.host.as_deref() == Some(player_id) {
            room.host = room.members.first().map(|m| m.player_id.clone());
            if let Some(host_id) = room.host.clone() {
                tracing::info!(room = room_id, host = %host_id, "relay host promoted");
                if let Some(frame) = server_frame(HOST_ANNOUNCE, &HostAnnouncePayload { host_id }) {
                    room.broadcast_except(player_id, &frame);
                }
            }
        }

        tracing::info!(room = room_id, player = player_id, "relay member left");
        if room.members.is_empty() {
            rooms.remove(room_id);
        }
    }
}

/// Encodes a relay-originated frame.
fn server_frame<T: Serialize>(kind: &str, payload: &T) -> Option<String> {
    let encoded = WireMessage::with_payload(kind, payload).and_then(|mut message| {
        message.sender_id = SERVER_ID.to_owned();
        message.to_json()
    });
    match encoded {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::warn!(kind, error = %err, "relay could not encode control frame");
            None
        }
    }
}

/// Parses the opening frame of a session.
fn parse_handshake(text: &str) -> TransportResult<HandshakePayload> {
    let message = WireMessage::from_json(text)?;
    if message.kind != HANDSHAKE {
        return Err(TransportError::Protocol(format!("expected handshake, got {}", message.kind)));
    }
    let handshake: HandshakePayload = message.payload_as()?;
    if handshake.player_id.is_empty() || handshake.room_id.is_empty() {
        return Err(TransportError::Protocol("handshake with empty id".into()));
    }
    Ok(handshake)
}

/// Serves one connection until it closes.
///
/// The first frame must be a handshake. Later frames are relayed; malformed
/// ones are logged and dropped.
pub async fn run_session(hub: Arc<RelayHub>, link: WsLink) {
    let WsLink { outgoing, mut incoming } = link;

    let handshake = match incoming.recv().await {
        Some(Ok(text)) => match parse_handshake(&text) {
            Ok(handshake) => handshake,
            Err(err) => {
                tracing::warn!(error = %err, "relay rejected session");
                return;
            }
        },
        Some(Err(err)) => {
            tracing::debug!(error = %err, "relay session failed before handshake");
            return;
        }
        None => return,
    };

    let HandshakePayload { player_id, room_id } = handshake;
    let session = hub.join(&room_id, &player_id, outgoing);

    while let Some(frame) = incoming.recv().await {
        match frame.and_then(|text| WireMessage::from_json(&text)) {
            Ok(message) => hub.relay(&room_id, &player_id, message),
            Err(TransportError::Serialization(err)) => {
                tracing::warn!(room = %room_id, player = %player_id, error = %err, "relay dropped malformed frame");
            }
            Err(err) => {
                tracing::debug!(room = %room_id, player = %player_id, error = %err, "relay session ended");
                break;
            }
        }
    }

    hub.leave(&room_id, &player_id, session);
}

/// TCP listener that upgrades connections and hands them to a [`RelayHub`].
pub struct RelayServer {
    listener: TcpListener,
    hub: Arc<RelayHub>,
}

impl RelayServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Socket`] if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| TransportError::Socket(err.to_string()))?;
        Ok(Self { listener, hub: RelayHub::new() })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Socket`] if the OS cannot report it.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|err| TransportError::Socket(err.to_string()))
    }

    /// The hub behind this server.
    #[must_use]
    pub fn hub(&self) -> Arc<RelayHub> {
        Arc::clone(&self.hub)
    }

    /// Accepts connections forever.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Socket`] if accepting fails.
    pub async fn run(self) -> TransportResult<()> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "relay listening");
        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(|err| TransportError::Socket(err.to_string()))?;
            tokio::spawn(serve_connection(Arc::clone(&self.hub), stream, addr));
        }
    }
}

async fn serve_connection(hub: Arc<RelayHub>, stream: TcpStream, addr: SocketAddr) {
    match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => {
            tracing::debug!(%addr, "relay accepted connection");
            run_session(hub, spawn_pumps(socket)).await;
        }
        Err(err) => tracing::warn!(%addr, error = %err, "websocket upgrade failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<WireMessage> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(WireMessage::from_json(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_first_member_is_host() {
        let hub = RelayHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.join("r1", "a", tx);

        let frames = decode(&mut rx);
        assert_eq!(frames[0].kind, PEERS_LIST);
        assert_eq!(frames[1].kind, HOST_ANNOUNCE);
        assert_eq!(frames[1].payload["hostId"], "a");
        assert_eq!(hub.host_of("r1").as_deref(), Some("a"));
    }

    #[test]
    fn test_host_leave_promotes_next() {
        let hub = RelayHub::new();
        let (a_tx, _a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let (c_tx, _c_rx) = mpsc::unbounded_channel();
        let a = hub.join("r1", "a", a_tx);
        hub.join("r1", "b", b_tx);
        hub.join("r1", "c", c_tx);
        decode(&mut b_rx);

        hub.leave("r1", "a", a);
        let frames = decode(&mut b_rx);
        assert_eq!(frames[0].kind, PLAYER_LEAVE);
        assert_eq!(frames[1].kind, HOST_ANNOUNCE);
        assert_eq!(frames[1].payload["hostId"], "b");
    }

    #[test]
    fn test_stale_session_does_not_evict() {
        let hub = RelayHub::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        let old = hub.join("r1", "a", old_tx);
        hub.join("r1", "a", new_tx);
        hub.leave("r1", "a", old);
        assert_eq!(hub.peer_count("r1"), 1);
    }

    #[test]
    fn test_relay_stamps_sender_and_routes() {
        let hub = RelayHub::new();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        hub.join("r1", "a", a_tx);
        hub.join("r1", "b", b_tx);
        hub.join("r1", "c", c_tx);
        decode(&mut a_rx);
        decode(&mut b_rx);
        decode(&mut c_rx);

        let mut msg = WireMessage::new("ping", serde_json::json!({}));
        msg.sender_id = "spoofed".into();
        msg.target_id = Some("c".into());
        hub.relay("r1", "a", msg);

        assert!(decode(&mut b_rx).is_empty());
        let got = decode(&mut c_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sender_id, "a");
    }
}
