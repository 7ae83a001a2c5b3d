//! # Transport Error Types
//!
//! Infrastructure failures. These stay at the transport boundary: they are
//! returned from `send`, pushed to error listeners, or logged and dropped.
//! They never carry game-logic errors.

use thiserror::Error;

/// Errors that can occur in a transport or relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is not (or no longer) connected.
    #[error("transport is not connected")]
    NotConnected,

    /// A peer with this id is already registered in the room.
    #[error("player {player_id} is already registered in room {room_id}")]
    DuplicatePeer {
        /// Room the registration targeted.
        room_id: String,
        /// Conflicting player id.
        player_id: String,
    },

    /// A unicast target is not in the room.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Encoding or decoding a frame failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A frame was well-formed JSON but violated the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Opening a connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The socket reported an error.
    #[error("socket error: {0}")]
    Socket(String),

    /// Transport settings were rejected before connecting.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// The underlying channel closed.
    #[error("connection closed")]
    Closed,
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
