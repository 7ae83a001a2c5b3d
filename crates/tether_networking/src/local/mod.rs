//! # In-Process Transport
//!
//! A zero-latency bus for instances living in the same process.
//!
//! ## Design
//!
//! - Rooms live in a [`LocalRegistry`] that is passed to every transport,
//!   so independent registries (one per test, say) never see each other
//! - Delivery is a synchronous call-through into the receiver's handlers
//! - The registry lock is released before any handler runs
//!
//! ```text
//! LocalRegistry
//!   "r1" -> [A (host), B, C]     registration order
//!   "r2" -> [X (host)]
//! ```
//!
//! ## Reentrancy
//!
//! Join and leave notifications run synchronously inside `join` and
//! `disconnect`. Handlers may send messages from those callbacks, but must
//! not synchronously re-register the same player id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{TransportError, TransportResult};
use crate::protocol::{Peer, WireMessage};
use crate::transport::{MessageFn, PeerFn, Subscription, Transport, TransportEvents};

/// One registered transport as seen by the registry.
struct LocalEndpoint {
    /// Player id.
    player_id: String,
    /// Handler tables of the owning transport.
    events: TransportEvents,
}

/// A room: peers in registration order plus the current host.
#[derive(Default)]
struct LocalRoom {
    /// Registered peers, oldest first.
    peers: Vec<Arc<LocalEndpoint>>,
    /// Current host id.
    host: Option<String>,
}

impl LocalRoom {
    fn position(&self, player_id: &str) -> Option<usize> {
        self.peers.iter().position(|p| p.player_id == player_id)
    }
}

/// Arena of in-process rooms.
///
/// Rooms are created on first join and removed when their last peer leaves.
#[derive(Default)]
pub struct LocalRegistry {
    rooms: Mutex<HashMap<String, LocalRoom>>,
}

impl LocalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of peers registered in a room.
    #[must_use]
    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.lock().get(room_id).map_or(0, |room| room.peers.len())
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Current host of a room.
    #[must_use]
    pub fn host_of(&self, room_id: &str) -> Option<String> {
        self.rooms.lock().get(room_id).and_then(|room| room.host.clone())
    }

    /// Peers of a room in registration order.
    #[must_use]
    pub fn peers(&self, room_id: &str) -> Vec<Peer> {
        let rooms = self.rooms.lock();
        let Some(room) = rooms.get(room_id) else {
            return Vec::new();
        };
        room.peers
            .iter()
            .map(|p| Peer {
                player_id: p.player_id.clone(),
                room_id: room_id.to_owned(),
                is_host: room.host.as_deref() == Some(p.player_id.as_str()),
            })
            .collect()
    }

    /// Ids of every peer in the room except `player_id`.
    fn others(&self, room_id: &str, player_id: &str) -> Vec<String> {
        self.rooms.lock().get(room_id).map_or_else(Vec::new, |room| {
            room.peers
                .iter()
                .filter(|p| p.player_id != player_id)
                .map(|p| p.player_id.clone())
                .collect()
        })
    }

    fn register(&self, room_id: &str, endpoint: Arc<LocalEndpoint>) -> TransportResult<()> {
        let existing = {
            let mut rooms = self.rooms.lock();
            let room = rooms.entry(room_id.to_owned()).or_default();
            if room.position(&endpoint.player_id).is_some() {
                return Err(TransportError::DuplicatePeer {
                    room_id: room_id.to_owned(),
                    player_id: endpoint.player_id.clone(),
                });
            }
            if room.peers.is_empty() {
                room.host = Some(endpoint.player_id.clone());
                tracing::info!(room = room_id, host = %endpoint.player_id, "local room created");
            }
            let existing = room.peers.clone();
            room.peers.push(Arc::clone(&endpoint));
            existing
        };

        tracing::debug!(room = room_id, player = %endpoint.player_id, peers = existing.len(), "local peer joined");

        // Pairwise introductions, outside the registry lock.
        for peer in &existing {
            peer.events.emit_join(&endpoint.player_id);
            endpoint.events.emit_join(&peer.player_id);
        }
        Ok(())
    }

    fn unregister(&self, room_id: &str, player_id: &str) {
        let (survivors, was_host, new_host) = {
            let mut rooms = self.rooms.lock();
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            let Some(index) = room.position(player_id) else {
                return;
            };
            room.peers.remove(index);

            let was_host = room.host.as_deref() == Some(player_id);
            if was_host {
                room.host = room.peers.first().map(|p| p.player_id.clone());
            }
            let survivors = room.peers.clone();
            let new_host = room.host.clone();
            if survivors.is_empty() {
                rooms.remove(room_id);
                tracing::info!(room = room_id, "local room closed");
            }
            (survivors, was_host, new_host)
        };

        tracing::debug!(room = room_id, player = player_id, was_host, "local peer left");

        for peer in &survivors {
            peer.events.emit_leave(player_id);
        }
        if !was_host {
            return;
        }
        for peer in &survivors {
            peer.events.emit_host_disconnect(player_id);
        }
        if let Some(host) = new_host {
            tracing::info!(room = room_id, host = %host, "local host promoted");
            for peer in &survivors {
                peer.events.emit_host_change(&host);
            }
        }
    }

    fn route(&self, room_id: &str, message: &WireMessage) -> TransportResult<()> {
        let recipients: Vec<Arc<LocalEndpoint>> = {
            let rooms = self.rooms.lock();
            let room = rooms.get(room_id).ok_or(TransportError::NotConnected)?;
            if room.position(&message.sender_id).is_none() {
                return Err(TransportError::NotConnected);
            }
            match message.target_id.as_deref() {
                Some(target) => {
                    let index = room
                        .position(target)
                        .ok_or_else(|| TransportError::UnknownPeer(target.to_owned()))?;
                    vec![Arc::clone(&room.peers[index])]
                }
                None => room
                    .peers
                    .iter()
                    .filter(|p| p.player_id != message.sender_id)
                    .cloned()
                    .collect(),
            }
        };

        for peer in recipients {
            peer.events.emit_message(message);
        }
        Ok(())
    }
}

/// Transport over a [`LocalRegistry`].
///
/// Leaves the room on [`Transport::disconnect`] or when dropped.
pub struct LocalTransport {
    /// Shared room arena.
    registry: Arc<LocalRegistry>,
    /// Our entry in the registry.
    endpoint: Arc<LocalEndpoint>,
    /// Room id.
    room_id: String,
    /// Cleared on disconnect.
    connected: AtomicBool,
}

impl LocalTransport {
    /// Registers a new peer in `room_id`.
    ///
    /// Every existing peer is told about the newcomer and the newcomer about
    /// every existing peer. The first peer in a room is host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DuplicatePeer`] if the id is taken.
    pub fn join(
        registry: &Arc<LocalRegistry>,
        room_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> TransportResult<Self> {
        let room_id = room_id.into();
        let endpoint = Arc::new(LocalEndpoint {
            player_id: player_id.into(),
            events: TransportEvents::new(),
        });
        registry.register(&room_id, Arc::clone(&endpoint))?;

        Ok(Self {
            registry: Arc::clone(registry),
            endpoint,
            room_id,
            connected: AtomicBool::new(true),
        })
    }

    /// Returns the registry this transport lives in.
    #[must_use]
    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.registry
    }

    /// Whether the transport is still registered.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Transport for LocalTransport {
    fn send(&self, mut message: WireMessage, target_id: Option<&str>) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        message.sender_id.clone_from(&self.endpoint.player_id);
        message.target_id = target_id.map(str::to_owned);
        self.registry.route(&self.room_id, &message)
    }

    fn on_message(&self, handler: Arc<MessageFn>) -> Subscription {
        self.endpoint.events.messages.add(handler)
    }

    fn on_peer_join(&self, handler: Arc<PeerFn>) -> Subscription {
        self.endpoint.events.joins.add(handler)
    }

    fn on_peer_leave(&self, handler: Arc<PeerFn>) -> Subscription {
        self.endpoint.events.leaves.add(handler)
    }

    fn on_host_disconnect(&self, handler: Arc<PeerFn>) -> Subscription {
        self.endpoint.events.host_disconnects.add(handler)
    }

    fn on_host_change(&self, handler: Arc<PeerFn>) -> Subscription {
        self.endpoint.events.host_changes.add(handler)
    }

    fn player_id(&self) -> &str {
        &self.endpoint.player_id
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn peer_ids(&self) -> Vec<String> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.registry.others(&self.room_id, &self.endpoint.player_id)
    }

    fn host_id(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        self.registry.host_of(&self.room_id)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.registry.unregister(&self.room_id, &self.endpoint.player_id);
            self.endpoint.events.clear();
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
