//! # WebSocket Backend
//!
//! Client/server relay over WebSocket text frames.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  handshake   ┌──────────────────────┐
//! │ WsTransport│ ───────────► │      RelayHub        │
//! │  (driver)  │ ◄─────────── │  rooms, host, order  │
//! └────────────┘  peers_list  └──────────────────────┘
//!       │          host_announce        │
//!       │   app frames (senderId) ◄────►│
//! ```
//!
//! The server owns membership and host election. A client's view of who is
//! host comes only from `host_announce`.
//!
//! ## Reconnection
//!
//! Fixed delay, bounded attempts. A completed handshake resets the counter.

mod client;
mod connector;
pub mod protocol;
mod server;

pub use client::WsTransport;
pub use connector::{ConnectFuture, HubConnector, TungsteniteConnector, WsConnector, WsLink};
pub use server::{run_session, RelayHub, RelayServer};

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Connection state of a [`WsTransport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected, and not trying to.
    #[default]
    Disconnected,
    /// First connection or handshake in progress.
    Connecting,
    /// Handshake complete. Sends are delivered.
    Connected,
    /// Connection lost, waiting to retry.
    Reconnecting,
}

/// WebSocket client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Relay URL.
    pub url: String,
    /// Room to join.
    pub room_id: String,
    /// Our player id.
    pub player_id: String,
    /// Reconnect after the socket closes.
    pub reconnect: bool,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}", crate::DEFAULT_RELAY_PORT),
            room_id: "lobby".to_owned(),
            player_id: String::new(),
            reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
        }
    }
}

impl WsConfig {
    /// Creates a config for one player in one room, with default policy.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        room_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            player_id: player_id.into(),
            ..Self::default()
        }
    }

    /// Checks that the ids and URL are usable.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] naming the bad field.
    pub fn validate(&self) -> TransportResult<()> {
        if self.url.is_empty() {
            return Err(TransportError::InvalidConfig("url is empty".into()));
        }
        if self.room_id.is_empty() {
            return Err(TransportError::InvalidConfig("room_id is empty".into()));
        }
        if self.player_id.is_empty() {
            return Err(TransportError::InvalidConfig("player_id is empty".into()));
        }
        Ok(())
    }
}
