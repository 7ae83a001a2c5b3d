//! # WebSocket Client Transport
//!
//! A driver task owns the connection loop:
//!
//! ```text
//! Connecting ──peers_list──► Connected ──close──► Reconnecting ──delay──┐
//!     ▲                                              │                  │
//!     └──────────────────────────────────────────────┼──────────────────┘
//!                                   attempts exhausted│
//!                                                    ▼
//!                                              Disconnected
//! ```
//!
//! Handlers run on the driver task. Peer and host events are derived from
//! relay control frames, so `is_host()` reflects server-side election.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::connector::{TungsteniteConnector, WsConnector, WsLink};
use super::protocol::{
    HandshakePayload, HostAnnouncePayload, PeerPayload, PeersListPayload, HANDSHAKE,
    HOST_ANNOUNCE, PEERS_LIST, PLAYER_JOIN, PLAYER_LEAVE,
};
use super::{ClientState, WsConfig};
use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;
use crate::transport::{
    ErrorFn, HandlerSet, MessageFn, PeerFn, Subscription, Transport, TransportEvents,
};

/// Membership as last reported by the relay.
#[derive(Default)]
struct LinkState {
    /// Other peers, in the order the relay listed them.
    peers: Vec<String>,
    /// Peers seen before the last drop. Reconciled against the next
    /// `peers_list` so unchanged peers are not reported again.
    previous: Vec<String>,
    /// Host per the last `host_announce`.
    host: Option<String>,
    /// Writer for the live, handshaken connection.
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

/// State shared by the transport handle and its driver task.
struct WsShared {
    config: WsConfig,
    events: TransportEvents,
    errors: HandlerSet<ErrorFn>,
    link: Mutex<LinkState>,
    state: watch::Sender<ClientState>,
    connect_attempts: AtomicU32,
}

impl WsShared {
    fn set_state(&self, state: ClientState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(player = %self.config.player_id, ?previous, ?state, "websocket state");
        }
    }

    fn report(&self, err: &TransportError) {
        tracing::warn!(player = %self.config.player_id, error = %err, "websocket transport error");
        for handler in self.errors.snapshot() {
            handler(err);
        }
    }

    /// Runs one connection to completion. Returns true if it handshook.
    async fn run_link(&self, link: WsLink) -> bool {
        let WsLink { outgoing, mut incoming } = link;

        let handshake = WireMessage::with_payload(
            HANDSHAKE,
            &HandshakePayload {
                player_id: self.config.player_id.clone(),
                room_id: self.config.room_id.clone(),
            },
        )
        .and_then(|mut message| {
            message.sender_id.clone_from(&self.config.player_id);
            message.to_json()
        });
        match handshake {
            Ok(frame) => {
                if outgoing.send(frame).is_err() {
                    self.report(&TransportError::Closed);
                    return false;
                }
            }
            Err(err) => {
                self.report(&err);
                return false;
            }
        }

        let mut handshaken = false;
        while let Some(frame) = incoming.recv().await {
            match frame {
                Ok(text) => handshaken |= self.handle_frame(&text, &outgoing),
                Err(err) => self.report(&err),
            }
        }

        {
            let mut link = self.link.lock();
            link.outgoing = None;
            link.host = None;
            let dropped = std::mem::take(&mut link.peers);
            link.previous.extend(dropped);
        }
        tracing::info!(player = %self.config.player_id, "websocket connection closed");
        handshaken
    }

    /// Dispatches one inbound frame. Returns true if it completed the handshake.
    fn handle_frame(&self, text: &str, outgoing: &mpsc::UnboundedSender<String>) -> bool {
        let message = match WireMessage::from_json(text) {
            Ok(message) => message,
            Err(err) => {
                self.report(&err);
                return false;
            }
        };

        let outcome = match message.kind.as_str() {
            PEERS_LIST => message
                .payload_as::<PeersListPayload>()
                .map(|list| self.on_peers_list(list.peers, outgoing)),
            PLAYER_JOIN => message.payload_as::<PeerPayload>().map(|peer| {
                self.on_player_join(peer.peer_id);
                false
            }),
            PLAYER_LEAVE => message.payload_as::<PeerPayload>().map(|peer| {
                self.on_player_leave(&peer.peer_id);
                false
            }),
            HOST_ANNOUNCE => message.payload_as::<HostAnnouncePayload>().map(|announce| {
                self.link.lock().host = Some(announce.host_id.clone());
                tracing::info!(player = %self.config.player_id, host = %announce.host_id, "host announced");
                self.events.emit_host_change(&announce.host_id);
                false
            }),
            _ => {
                self.events.emit_message(&message);
                Ok(false)
            }
        };

        outcome.unwrap_or_else(|err| {
            self.report(&err);
            false
        })
    }

    fn on_peers_list(&self, peers: Vec<String>, outgoing: &mpsc::UnboundedSender<String>) -> bool {
        let me = &self.config.player_id;
        let peers: Vec<String> = peers.into_iter().filter(|p| p != me).collect();
        let (joined, left) = {
            let mut link = self.link.lock();
            let mut known = std::mem::take(&mut link.previous);
            known.extend(link.peers.drain(..));
            let joined: Vec<String> = peers.iter().filter(|p| !known.contains(*p)).cloned().collect();
            let left: Vec<String> = known.into_iter().filter(|p| !peers.contains(p)).collect();
            link.peers = peers;
            link.outgoing = Some(outgoing.clone());
            (joined, left)
        };

        self.set_state(ClientState::Connected);
        tracing::info!(player = %me, room = %self.config.room_id, peers = joined.len(), "websocket handshake complete");

        for peer in &left {
            self.events.emit_leave(peer);
        }
        for peer in &joined {
            self.events.emit_join(peer);
        }
        true
    }

    fn on_player_join(&self, peer_id: String) {
        {
            let mut link = self.link.lock();
            if peer_id == self.config.player_id || link.peers.contains(&peer_id) {
                return;
            }
            link.peers.push(peer_id.clone());
        }
        self.events.emit_join(&peer_id);
    }

    fn on_player_leave(&self, peer_id: &str) {
        let was_host = {
            let mut link = self.link.lock();
            let Some(index) = link.peers.iter().position(|p| p == peer_id) else {
                return;
            };
            link.peers.remove(index);
            let was_host = link.host.as_deref() == Some(peer_id);
            if was_host {
                link.host = None;
            }
            was_host
        };

        self.events.emit_leave(peer_id);
        if was_host {
            self.events.emit_host_disconnect(peer_id);
        }
    }
}

/// Connection loop: connect, serve, back off, retry.
async fn drive(shared: Arc<WsShared>, connector: Arc<dyn WsConnector>) {
    let mut attempts = 0u32;
    loop {
        shared.connect_attempts.fetch_add(1, Ordering::AcqRel);
        match connector.connect(&shared.config.url).await {
            Ok(link) => {
                if shared.run_link(link).await {
                    attempts = 0;
                }
            }
            Err(err) => shared.report(&err),
        }

        if !shared.config.reconnect || attempts >= shared.config.max_reconnect_attempts {
            break;
        }
        attempts += 1;
        shared.set_state(ClientState::Reconnecting);
        tracing::info!(
            player = %shared.config.player_id,
            attempt = attempts,
            max = shared.config.max_reconnect_attempts,
            "websocket reconnecting"
        );
        tokio::time::sleep(Duration::from_millis(shared.config.reconnect_delay_ms)).await;
    }
    shared.set_state(ClientState::Disconnected);
}

/// WebSocket client implementing [`Transport`].
///
/// Must be created inside a tokio runtime. Dropping it disconnects.
pub struct WsTransport {
    shared: Arc<WsShared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    /// Connects over the network.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] for unusable settings, or
    /// [`TransportError::Connect`] outside a tokio runtime.
    pub fn connect(config: WsConfig) -> TransportResult<Self> {
        Self::connect_with(config, Arc::new(TungsteniteConnector))
    }

    /// Connects through a custom connector.
    ///
    /// # Errors
    ///
    /// Same as [`WsTransport::connect`].
    pub fn connect_with(config: WsConfig, connector: Arc<dyn WsConnector>) -> TransportResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (state, _) = watch::channel(ClientState::Connecting);
        let shared = Arc::new(WsShared {
            config,
            events: TransportEvents::new(),
            errors: HandlerSet::new(),
            link: Mutex::new(LinkState::default()),
            state,
            connect_attempts: AtomicU32::new(0),
        });

        let driver = runtime.spawn(drive(Arc::clone(&shared), connector));
        Ok(Self { shared, driver: Mutex::new(Some(driver)) })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.shared.state.borrow()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Connections opened so far, including the first.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.shared.connect_attempts.load(Ordering::Acquire)
    }

    /// Waits until the handshake completes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] once the transport has given
    /// up and is `Disconnected`.
    pub async fn wait_for_ready(&self) -> TransportResult<()> {
        let mut rx = self.shared.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ClientState::Connected => return Ok(()),
                ClientState::Disconnected => return Err(TransportError::NotConnected),
                ClientState::Connecting | ClientState::Reconnecting => {}
            }
            rx.changed().await.map_err(|_| TransportError::Closed)?;
        }
    }

    /// Subscribes to connection, socket and parse errors.
    pub fn on_error(&self, handler: Arc<ErrorFn>) -> Subscription {
        self.shared.errors.add(handler)
    }
}

impl Transport for WsTransport {
    fn send(&self, mut message: WireMessage, target_id: Option<&str>) -> TransportResult<()> {
        let outgoing = self
            .shared
            .link
            .lock()
            .outgoing
            .clone()
            .ok_or(TransportError::NotConnected)?;
        message.sender_id.clone_from(&self.shared.config.player_id);
        message.target_id = target_id.map(str::to_owned);
        outgoing.send(message.to_json()?).map_err(|_| TransportError::NotConnected)
    }

    fn on_message(&self, handler: Arc<MessageFn>) -> Subscription {
        self.shared.events.messages.add(handler)
    }

    fn on_peer_join(&self, handler: Arc<PeerFn>) -> Subscription {
        self.shared.events.joins.add(handler)
    }

    fn on_peer_leave(&self, handler: Arc<PeerFn>) -> Subscription {
        self.shared.events.leaves.add(handler)
    }

    fn on_host_disconnect(&self, handler: Arc<PeerFn>) -> Subscription {
        self.shared.events.host_disconnects.add(handler)
    }

    fn on_host_change(&self, handler: Arc<PeerFn>) -> Subscription {
        self.shared.events.host_changes.add(handler)
    }

    fn player_id(&self) -> &str {
        &self.shared.config.player_id
    }

    fn room_id(&self) -> &str {
        &self.shared.config.room_id
    }

    fn peer_ids(&self) -> Vec<String> {
        self.shared.link.lock().peers.clone()
    }

    fn host_id(&self) -> Option<String> {
        self.shared.link.lock().host.clone()
    }

    fn disconnect(&self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
            *self.shared.link.lock() = LinkState::default();
            self.shared.set_state(ClientState::Disconnected);
            self.shared.events.clear();
            self.shared.errors.clear();
            tracing::info!(player = %self.shared.config.player_id, "websocket transport disconnected");
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
