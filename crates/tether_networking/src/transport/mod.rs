//! # Transport Contract
//!
//! The one interface every backend satisfies, plus the handler tables the
//! backends (and the runtime) share.
//!
//! ## Handler Dispatch
//!
//! ```text
//! emit(event)
//!   lock table -> clone handler list -> unlock
//!   for handler in list: handler(event)
//! ```
//!
//! Handlers run with no lock held, so a handler may send, subscribe or
//! unsubscribe from inside a callback.

mod handlers;

pub use handlers::{HandlerSet, Subscription};

use std::sync::Arc;

use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;

/// Handler for application messages.
pub type MessageFn = dyn Fn(&WireMessage) + Send + Sync;

/// Handler for peer events. The argument is the peer's player id.
pub type PeerFn = dyn Fn(&str) + Send + Sync;

/// Handler for infrastructure errors.
pub type ErrorFn = dyn Fn(&TransportError) + Send + Sync;

/// Contract shared by every transport backend.
///
/// Sends are fire-and-forget. Per sender/receiver pair, delivery order
/// matches send order.
pub trait Transport: Send + Sync {
    /// Sends a message to one peer (`target_id`) or to every other peer.
    ///
    /// The transport stamps `sender_id` and `target_id` on the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when the transport cannot
    /// currently deliver, or a backend-specific error.
    fn send(&self, message: WireMessage, target_id: Option<&str>) -> TransportResult<()>;

    /// Subscribes to application messages.
    fn on_message(&self, handler: Arc<MessageFn>) -> Subscription;

    /// Subscribes to peer arrivals.
    fn on_peer_join(&self, handler: Arc<PeerFn>) -> Subscription;

    /// Subscribes to peer departures.
    fn on_peer_leave(&self, handler: Arc<PeerFn>) -> Subscription;

    /// Subscribes to host departures. Fires after the matching peer-leave.
    fn on_host_disconnect(&self, handler: Arc<PeerFn>) -> Subscription;

    /// Subscribes to host assignments (initial assignment and promotions).
    fn on_host_change(&self, handler: Arc<PeerFn>) -> Subscription;

    /// This peer's player id.
    fn player_id(&self) -> &str;

    /// Room this transport is registered in.
    fn room_id(&self) -> &str;

    /// Ids of the other peers currently known in the room.
    fn peer_ids(&self) -> Vec<String>;

    /// Current host, if known.
    fn host_id(&self) -> Option<String>;

    /// Whether this peer currently holds host authority.
    fn is_host(&self) -> bool {
        self.host_id().as_deref() == Some(self.player_id())
    }

    /// Leaves the room. Further sends fail with `NotConnected`.
    fn disconnect(&self);
}

/// The five event channels of a [`Transport`], bundled for backends.
#[derive(Default)]
pub struct TransportEvents {
    /// Application messages.
    pub messages: HandlerSet<MessageFn>,
    /// Peer arrivals.
    pub joins: HandlerSet<PeerFn>,
    /// Peer departures.
    pub leaves: HandlerSet<PeerFn>,
    /// Host departures.
    pub host_disconnects: HandlerSet<PeerFn>,
    /// Host assignments.
    pub host_changes: HandlerSet<PeerFn>,
}

impl TransportEvents {
    /// Creates empty handler tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an application message.
    pub fn emit_message(&self, message: &WireMessage) {
        for handler in self.messages.snapshot() {
            handler(message);
        }
    }

    /// Announces a peer arrival.
    pub fn emit_join(&self, peer_id: &str) {
        for handler in self.joins.snapshot() {
            handler(peer_id);
        }
    }

    /// Announces a peer departure.
    pub fn emit_leave(&self, peer_id: &str) {
        for handler in self.leaves.snapshot() {
            handler(peer_id);
        }
    }

    /// Announces that the host left.
    pub fn emit_host_disconnect(&self, host_id: &str) {
        for handler in self.host_disconnects.snapshot() {
            handler(host_id);
        }
    }

    /// Announces a host assignment.
    pub fn emit_host_change(&self, host_id: &str) {
        for handler in self.host_changes.snapshot() {
            handler(host_id);
        }
    }

    /// Drops every handler.
    pub fn clear(&self) {
        self.messages.clear();
        self.joins.clear();
        self.leaves.clear();
        self.host_disconnects.clear();
        self.host_changes.clear();
    }
}
