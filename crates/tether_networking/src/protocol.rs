//! # Wire Protocol
//!
//! The transport-agnostic message envelope.
//!
//! ## Envelope
//!
//! ```text
//! {
//!   "type":     "patch",          // application or protocol message kind
//!   "senderId": "alice",          // stamped by the transport on send
//!   "targetId": "bob",            // absent = broadcast to everyone but sender
//!   "payload":  { ... }           // opaque to the transport
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportResult;

/// Transport-agnostic message envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Player that sent the message.
    #[serde(default)]
    pub sender_id: String,
    /// Unicast target. `None` means broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Message body.
    #[serde(default)]
    pub payload: Value,
}

impl WireMessage {
    /// Creates an unaddressed message. The transport fills in the sender.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            sender_id: String::new(),
            target_id: None,
            payload,
        }
    }

    /// Creates a message with a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] if the payload
    /// cannot be represented as JSON.
    pub fn with_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> TransportResult<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Decodes the payload into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] on shape mismatch.
    pub fn payload_as<T: DeserializeOwned>(&self) -> TransportResult<T> {
        Ok(T::deserialize(&self.payload)?)
    }

    /// Returns true if the message has no unicast target.
    #[inline]
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.target_id.is_none()
    }

    /// Encodes the message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] on encoding failure.
    pub fn to_json(&self) -> TransportResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Serialization`] for malformed frames.
    pub fn from_json(text: &str) -> TransportResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A registered participant in a room.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Player id, unique within the room.
    pub player_id: String,
    /// Room the peer is registered in.
    pub room_id: String,
    /// Whether this peer currently holds host authority.
    pub is_host: bool,
}
