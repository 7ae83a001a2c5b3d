//! [`Transport`] over a [`BridgeWindow`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::frames::{
    BridgeFrame, BridgeKind, DeliverPayload, HostAnnouncePayload, HostDisconnectPayload,
    PeerJoinPayload, PeerLeavePayload, SendPayload, WelcomePayload,
};
use super::relay::BridgeWindow;
use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;
use crate::transport::{MessageFn, PeerFn, Subscription, Transport, TransportEvents};

/// Room view built from relay frames.
#[derive(Default)]
struct BridgeView {
    welcomed: bool,
    peers: Vec<String>,
    host: Option<String>,
}

/// Bridge-backed transport.
///
/// Nothing is delivered until the embedding loop calls
/// [`BridgeTransport::pump`]. Handlers run inside `pump`.
pub struct BridgeTransport {
    window: BridgeWindow,
    room_id: String,
    player_id: String,
    events: TransportEvents,
    view: Mutex<BridgeView>,
    connected: AtomicBool,
}

impl BridgeTransport {
    /// Registers `player_id` in `room_id` through `window`.
    ///
    /// Registration completes when the relay's welcome is pumped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] for empty ids.
    pub fn register(
        window: BridgeWindow,
        room_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> TransportResult<Self> {
        let room_id = room_id.into();
        let player_id = player_id.into();
        if room_id.is_empty() || player_id.is_empty() {
            return Err(TransportError::InvalidConfig("bridge ids must not be empty".into()));
        }

        let frame = BridgeFrame::new(BridgeKind::Register, json!({})).addressed(&room_id, &player_id);
        window.post(frame.to_value()?);

        Ok(Self {
            window,
            room_id,
            player_id,
            events: TransportEvents::new(),
            view: Mutex::new(BridgeView::default()),
            connected: AtomicBool::new(true),
        })
    }

    /// Whether the relay has accepted the registration.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.view.lock().welcomed
    }

    /// Drains the inbox in FIFO order, dispatching to handlers.
    ///
    /// Returns the number of frames processed.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        while let Some(value) = self.window.try_recv() {
            if !self.connected.load(Ordering::Acquire) {
                break;
            }
            self.dispatch(value);
            processed += 1;
        }
        processed
    }

    fn dispatch(&self, value: Value) {
        let frame = match BridgeFrame::from_value(value) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(player = %self.player_id, error = %err, "malformed bridge frame dropped");
                return;
            }
        };

        let outcome = match frame.kind {
            BridgeKind::Welcome => frame.payload_as().map(|welcome| self.on_welcome(welcome)),
            BridgeKind::Deliver => frame
                .payload_as::<DeliverPayload>()
                .map(|deliver| self.events.emit_message(&deliver.message)),
            BridgeKind::PeerJoin => frame.payload_as().map(|join| self.on_peer_join(join)),
            BridgeKind::PeerLeave => frame.payload_as().map(|leave| self.on_peer_leave(&leave)),
            BridgeKind::HostDisconnect => frame
                .payload_as::<HostDisconnectPayload>()
                .map(|gone| self.events.emit_host_disconnect(&gone.was_host)),
            BridgeKind::HostAnnounce => frame
                .payload_as::<HostAnnouncePayload>()
                .map(|announce| self.on_host_announce(announce.host_id)),
            kind => {
                tracing::warn!(player = %self.player_id, ?kind, "frame-bound message has relay kind");
                Ok(())
            }
        };

        if let Err(err) = outcome {
            tracing::warn!(player = %self.player_id, kind = ?frame.kind, error = %err, "bad bridge payload dropped");
        }
    }

    fn on_welcome(&self, welcome: WelcomePayload) {
        {
            let mut view = self.view.lock();
            view.welcomed = true;
            view.peers.clone_from(&welcome.peers);
            view.host = Some(welcome.host_id.clone());
        }
        tracing::info!(
            room = %self.room_id,
            player = %self.player_id,
            is_host = welcome.is_host,
            "bridge registration accepted"
        );
        for peer in &welcome.peers {
            self.events.emit_join(peer);
        }
        self.events.emit_host_change(&welcome.host_id);
    }

    fn on_peer_join(&self, join: PeerJoinPayload) {
        {
            let mut view = self.view.lock();
            if view.peers.contains(&join.peer_id) {
                return;
            }
            view.peers.push(join.peer_id.clone());
        }
        self.events.emit_join(&join.peer_id);
    }

    fn on_peer_leave(&self, leave: &PeerLeavePayload) {
        {
            let mut view = self.view.lock();
            view.peers.retain(|p| *p != leave.peer_id);
            if leave.was_host {
                view.host = None;
            }
        }
        self.events.emit_leave(&leave.peer_id);
    }

    fn on_host_announce(&self, host_id: String) {
        self.view.lock().host = Some(host_id.clone());
        self.events.emit_host_change(&host_id);
    }
}

impl Transport for BridgeTransport {
    fn send(&self, message: WireMessage, target_id: Option<&str>) -> TransportResult<()> {
        if !self.connected.load(Ordering::Acquire) || !self.is_registered() {
            return Err(TransportError::NotConnected);
        }
        let payload = SendPayload { message, target_id: target_id.map(str::to_owned) };
        let frame = BridgeFrame::with_payload(BridgeKind::Send, &payload)?;
        self.window.post(frame.to_value()?);
        Ok(())
    }

    fn on_message(&self, handler: Arc<MessageFn>) -> Subscription {
        self.events.messages.add(handler)
    }

    fn on_peer_join(&self, handler: Arc<PeerFn>) -> Subscription {
        self.events.joins.add(handler)
    }

    fn on_peer_leave(&self, handler: Arc<PeerFn>) -> Subscription {
        self.events.leaves.add(handler)
    }

    fn on_host_disconnect(&self, handler: Arc<PeerFn>) -> Subscription {
        self.events.host_disconnects.add(handler)
    }

    fn on_host_change(&self, handler: Arc<PeerFn>) -> Subscription {
        self.events.host_changes.add(handler)
    }

    fn player_id(&self) -> &str {
        &self.player_id
    }

    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn peer_ids(&self) -> Vec<String> {
        self.view.lock().peers.clone()
    }

    fn host_id(&self) -> Option<String> {
        self.view.lock().host.clone()
    }

    fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        match BridgeFrame::new(BridgeKind::Unregister, json!({})).to_value() {
            Ok(value) => self.window.post(value),
            Err(err) => tracing::warn!(error = %err, "bridge unregister encoding failed"),
        }
        *self.view.lock() = BridgeView::default();
        self.events.clear();
        tracing::info!(room = %self.room_id, player = %self.player_id, "bridge transport disconnected");
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
