//! Control frames exchanged between [`super::WsTransport`] and the relay.
//!
//! Control frames use the ordinary [`crate::WireMessage`] envelope with
//! `senderId` set to [`SERVER_ID`]. Every other `type` is application
//! traffic and passes through untouched.

use serde::{Deserialize, Serialize};

/// Sender id stamped on relay-originated frames.
pub const SERVER_ID: &str = "server";

/// Client → server, first frame on every connection.
pub const HANDSHAKE: &str = "handshake";
/// Server → client: a peer entered the room.
pub const PLAYER_JOIN: &str = "player_join";
/// Server → client: a peer left the room.
pub const PLAYER_LEAVE: &str = "player_leave";
/// Server → client: the room's host.
pub const HOST_ANNOUNCE: &str = "host_announce";
/// Server → client: current roster. Completes the handshake.
pub const PEERS_LIST: &str = "peers_list";

/// Payload of [`HANDSHAKE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    /// Joining player.
    pub player_id: String,
    /// Target room.
    pub room_id: String,
}

/// Payload of [`PLAYER_JOIN`] and [`PLAYER_LEAVE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerPayload {
    /// The peer that joined or left.
    pub peer_id: String,
}

/// Payload of [`HOST_ANNOUNCE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAnnouncePayload {
    /// Current host.
    pub host_id: String,
}

/// Payload of [`PEERS_LIST`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersListPayload {
    /// Every other peer in the room, in registration order.
    pub peers: Vec<String>,
}

/// Returns true for frame types the transport consumes itself.
#[must_use]
pub fn is_control(kind: &str) -> bool {
    matches!(kind, HANDSHAKE | PLAYER_JOIN | PLAYER_LEAVE | HOST_ANNOUNCE | PEERS_LIST)
}
