//! # Bridge Backend
//!
//! Window-message relay for peers embedded as sandboxed frames in one page.
//!
//! ## Frames
//!
//! | type                     | direction     | payload                       |
//! |--------------------------|---------------|-------------------------------|
//! | `BRIDGE_REGISTER`        | frame → relay | `{}` (ids on the envelope)    |
//! | `BRIDGE_UNREGISTER`      | frame → relay | `{}`                          |
//! | `BRIDGE_SEND`            | frame → relay | `{message, targetId?}`        |
//! | `BRIDGE_DELIVER`         | relay → frame | `{message}`                   |
//! | `BRIDGE_WELCOME`         | relay → frame | `{isHost, hostId, peers}`     |
//! | `BRIDGE_PEER_JOIN`       | relay → frame | `{peerId}`                    |
//! | `BRIDGE_PEER_LEAVE`      | relay → frame | `{peerId, wasHost}`           |
//! | `BRIDGE_HOST_DISCONNECT` | relay → frame | `{wasHost}` (departed host)   |
//! | `BRIDGE_HOST_ANNOUNCE`   | relay → frame | `{hostId}`                    |
//!
//! Inboxes are FIFO, so per-pair ordering survives the hop through the relay.

mod frames;
mod relay;
mod transport;

pub use frames::{
    BridgeFrame, BridgeKind, DeliverPayload, HostAnnouncePayload, HostDisconnectPayload,
    PeerJoinPayload, PeerLeavePayload, SendPayload, WelcomePayload,
};
pub use relay::{BridgeRelay, BridgeWindow, WindowId};
pub use transport::BridgeTransport;
