//! # TETHER Networking - The Relay Layer
//!
//! Pluggable message transports for host-authoritative sessions.
//!
//! ## Architecture
//!
//! Every backend implements one contract, [`Transport`]:
//!
//! - **Local**: in-process bus; rooms live in an injected [`LocalRegistry`]
//! - **WebSocket**: client with fixed-delay reconnection; host status is
//!   assigned by the relay server ([`RelayHub`])
//! - **Bridge**: a page-level [`BridgeRelay`] brokering window messages
//!   between sandboxed frames
//!
//! ```text
//!   Runtime (host)         Runtime (client)       Runtime (client)
//!        |                       ^                       ^
//!        | send(patch)           | on_message            | on_message
//!        v                       |                       |
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │        Transport: local bus | WebSocket relay | bridge       │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Model
//!
//! Fire-and-forget. No acknowledgements, no flow control. Messages from one
//! sender to one receiver arrive in send order; nothing is promised about
//! interleaving between different senders.
//!
//! ## Host Election
//!
//! The first peer to register in a room is host. When the host leaves, the
//! earliest remaining registrant is promoted. Registration order is the only
//! input, so host identity is reproducible.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bridge;
pub mod error;
pub mod local;
pub mod protocol;
pub mod transport;
pub mod websocket;

// Re-exports for convenience
pub use bridge::{BridgeFrame, BridgeKind, BridgeRelay, BridgeTransport, BridgeWindow, WindowId};
pub use error::{TransportError, TransportResult};
pub use local::{LocalRegistry, LocalTransport};
pub use protocol::{Peer, WireMessage};
pub use transport::{
    ErrorFn, HandlerSet, MessageFn, PeerFn, Subscription, Transport, TransportEvents,
};
pub use websocket::{
    run_session, ClientState, ConnectFuture, HubConnector, RelayHub, RelayServer,
    TungsteniteConnector, WsConfig, WsConnector, WsLink, WsTransport,
};

/// Default port for the WebSocket relay.
pub const DEFAULT_RELAY_PORT: u16 = 7878;
