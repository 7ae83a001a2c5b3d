//! Bridge frame envelope and payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportResult;
use crate::protocol::WireMessage;

/// Bridge frame kinds, serialized in `SCREAMING_SNAKE_CASE` with a
/// `BRIDGE_` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeKind {
    /// Frame → relay: join a room.
    #[serde(rename = "BRIDGE_REGISTER")]
    Register,
    /// Frame → relay: leave the room.
    #[serde(rename = "BRIDGE_UNREGISTER")]
    Unregister,
    /// Frame → relay: route a message.
    #[serde(rename = "BRIDGE_SEND")]
    Send,
    /// Relay → frame: a routed message.
    #[serde(rename = "BRIDGE_DELIVER")]
    Deliver,
    /// Relay → frame: registration accepted.
    #[serde(rename = "BRIDGE_WELCOME")]
    Welcome,
    /// Relay → frame: a peer registered.
    #[serde(rename = "BRIDGE_PEER_JOIN")]
    PeerJoin,
    /// Relay → frame: a peer left.
    #[serde(rename = "BRIDGE_PEER_LEAVE")]
    PeerLeave,
    /// Relay → frame: the host left.
    #[serde(rename = "BRIDGE_HOST_DISCONNECT")]
    HostDisconnect,
    /// Relay → frame: a peer was promoted to host.
    #[serde(rename = "BRIDGE_HOST_ANNOUNCE")]
    HostAnnounce,
}

/// Envelope posted between frames and the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeFrame {
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: BridgeKind,
    /// Room, on registration frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Player, on registration frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    /// Kind-specific body.
    #[serde(default)]
    pub payload: Value,
}

impl BridgeFrame {
    /// Creates a frame with no routing ids.
    #[must_use]
    pub fn new(kind: BridgeKind, payload: Value) -> Self {
        Self { kind, room_id: None, player_id: None, payload }
    }

    /// Creates a frame with a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] if the payload
    /// cannot be represented as JSON.
    pub fn with_payload<T: Serialize>(kind: BridgeKind, payload: &T) -> TransportResult<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Sets the room and player ids.
    #[must_use]
    pub fn addressed(mut self, room_id: &str, player_id: &str) -> Self {
        self.room_id = Some(room_id.to_owned());
        self.player_id = Some(player_id.to_owned());
        self
    }

    /// Decodes a posted value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] for malformed frames.
    pub fn from_value(value: Value) -> TransportResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encodes for posting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] on encoding failure.
    pub fn to_value(&self) -> TransportResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes the payload into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] on shape mismatch.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> TransportResult<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// `BRIDGE_SEND` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Message to route.
    pub message: WireMessage,
    /// Unicast target, or broadcast when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// `BRIDGE_DELIVER` body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverPayload {
    /// Routed message, sender stamped.
    pub message: WireMessage,
}

/// `BRIDGE_WELCOME` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Whether the new registrant is host.
    pub is_host: bool,
    /// Current host.
    pub host_id: String,
    /// Other peers in registration order.
    pub peers: Vec<String>,
}

/// `BRIDGE_PEER_JOIN` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoinPayload {
    /// New peer.
    pub peer_id: String,
}

/// `BRIDGE_PEER_LEAVE` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeavePayload {
    /// Departed peer.
    pub peer_id: String,
    /// Whether the departed peer was host.
    pub was_host: bool,
}

/// `BRIDGE_HOST_DISCONNECT` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDisconnectPayload {
    /// Id of the departed host.
    pub was_host: String,
}

/// `BRIDGE_HOST_ANNOUNCE` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAnnouncePayload {
    /// Promoted host.
    pub host_id: String,
}
