//! # Session Runtime
//!
//! One runtime per participant. The host executes actions; clients mirror.
//!
//! ## Host Path
//!
//! ```text
//! submit_action(name, input)
//!   lock state
//!     working = state.clone()
//!     handler(working, ctx, input)     error -> discard working, return Err
//!     patches = diff(state, working)
//!     tick += 1; state = working
//!   unlock
//!   send patch {patches, tick, baseTick} -> every client
//!   send event {name, data}            -> every client
//!   notify listeners
//! ```
//!
//! ## Client Path
//!
//! ```text
//! submit_action      -> action {name, input} -> host
//! patch from host    -> baseTick == last tick ? apply : stale (drop) | gap (desync)
//! snapshot from host -> replace state, clear desync
//! apply failure      -> keep old state, mark desynced, sync_request -> host
//! ```
//!
//! ## Locking
//!
//! The state lock is never held while sending or running listeners. Host
//! sends go through a reentrant ordering lock so patches leave in commit
//! order even when several threads submit actions.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use serde_json::Value;
use tether_core::{apply_patches, generate_diff, DeterministicRandom, Patch, State};
use tether_networking::{HandlerSet, Subscription, Transport, TransportError, WireMessage};

use crate::config::RuntimeConfig;
use crate::context::{ActionContext, GameEvent, SetupContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::game::GameDefinition;
use crate::messages::{
    ActionMessage, EventMessage, PatchMessage, SnapshotMessage, SyncRequest, ACTION, EVENT, PATCH,
    SNAPSHOT, SYNC_REQUEST,
};

/// Called with the new state and its tick whenever state changes.
pub type ChangeFn = dyn Fn(&State, u64) + Send + Sync;

/// Called with each committed or applied patch set and its tick.
pub type PatchFn = dyn Fn(&[Patch], u64) + Send + Sync;

/// Called for every game event seen by this runtime.
pub type EventFn = dyn Fn(&GameEvent) + Send + Sync;

/// Called before an action runs on the host or is forwarded by a client.
pub type SubmitFn = dyn Fn(&ActionRequest<'_>) + Send + Sync;

/// Called after an action commits on the host or is forwarded by a client.
/// Failed actions never reach it.
pub type ActionFn = dyn Fn(&ActionInfo) + Send + Sync;

/// Called when the runtime desyncs, with the reason.
pub type DesyncFn = dyn Fn(&str) + Send + Sync;

/// Lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Running `setup`. Transport messages are dropped.
    Initializing,
    /// Accepting actions and messages.
    Running,
    /// Torn down. Actions are ignored.
    Destroyed,
}

/// What a submit listener sees, before anything runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionRequest<'a> {
    /// Action name.
    pub name: &'a str,
    /// Action input.
    pub input: &'a Value,
    /// Submitting player.
    pub player_id: &'a str,
    /// Target named by the submitter.
    pub target_id: Option<&'a str>,
    /// True if this runtime will only forward the action to the host.
    pub forwarded: bool,
}

/// What an action listener sees.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionInfo {
    /// Action name.
    pub name: String,
    /// Action input.
    pub input: Value,
    /// Submitting player.
    pub player_id: String,
    /// Target named by the submitter.
    pub target_id: Option<String>,
    /// Tick after the action.
    pub tick: u64,
    /// Time spent executing (host) or sending (client).
    pub duration: Duration,
    /// True if this runtime only forwarded the action to the host.
    pub forwarded: bool,
}

/// Mutable runtime state, guarded by one lock.
struct Inner {
    phase: Phase,
    state: State,
    /// Host: actions and hooks committed. Client: tick of the last applied update.
    tick: u64,
    /// Tick of the state last sent to (host) or received from (client) the room.
    synced_tick: u64,
    /// Client has received a snapshot since starting.
    synced: bool,
    desynced: bool,
    random: DeterministicRandom,
    /// Host that most recently left; its leave hook runs on promotion.
    departed_host: Option<String>,
    subscriptions: Vec<Subscription>,
}

/// Result of one host-side commit, published after the lock is released.
struct Commit {
    patches: Vec<Patch>,
    base_tick: u64,
    tick: u64,
    /// Set when the root itself was replaced and only a snapshot can carry it.
    snapshot: Option<State>,
    /// New state for change listeners, when anything changed.
    changed: Option<State>,
    events: Vec<GameEvent>,
}

/// Outcome of an inbound patch on a client.
enum PatchOutcome {
    Applied { patches: Vec<Patch>, tick: u64, state: Option<State> },
    Ignored,
    Desync(String),
}

#[derive(Default)]
struct Listeners {
    change: HandlerSet<ChangeFn>,
    patch: HandlerSet<PatchFn>,
    event: HandlerSet<EventFn>,
    submit: HandlerSet<SubmitFn>,
    action: HandlerSet<ActionFn>,
    desync: HandlerSet<DesyncFn>,
}

impl Listeners {
    fn clear(&self) {
        self.change.clear();
        self.patch.clear();
        self.event.clear();
        self.submit.clear();
        self.action.clear();
        self.desync.clear();
    }
}

struct Shared {
    definition: GameDefinition,
    transport: Arc<dyn Transport>,
    player_id: String,
    inner: Mutex<Inner>,
    /// Serializes host commit-and-send so patches leave in tick order.
    outbound: ReentrantMutex<()>,
    listeners: Listeners,
}

/// Host-authoritative state runtime.
///
/// Dropping the runtime destroys it.
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Runs setup, subscribes to the transport and starts syncing.
    ///
    /// A host broadcasts its initial snapshot; a client asks the host for
    /// one as soon as the host is known.
    pub fn new(definition: GameDefinition, transport: Arc<dyn Transport>, config: RuntimeConfig) -> Self {
        let player_id = transport.player_id().to_owned();
        let shared = Arc::new(Shared {
            definition,
            transport,
            player_id,
            inner: Mutex::new(Inner {
                phase: Phase::Initializing,
                state: State::Null,
                tick: 0,
                synced_tick: 0,
                synced: false,
                desynced: false,
                random: DeterministicRandom::new(config.seed),
                departed_host: None,
                subscriptions: Vec::new(),
            }),
            outbound: ReentrantMutex::new(()),
            listeners: Listeners::default(),
        });

        // Subscribed before setup: anything delivered while Initializing is
        // dropped, and the start-up snapshot request covers it.
        let subscriptions = Shared::subscribe(&shared);
        let mut random = DeterministicRandom::new(config.seed);
        let peer_ids = shared.transport.peer_ids();
        let state = shared.definition.run_setup(&mut SetupContext {
            player_id: &shared.player_id,
            peer_ids: &peer_ids,
            random: &mut random,
        });
        {
            let mut inner = shared.inner.lock();
            inner.state = state;
            inner.random = random;
            inner.subscriptions = subscriptions;
            inner.phase = Phase::Running;
        }
        tracing::info!(
            player = %shared.player_id,
            room = %shared.transport.room_id(),
            host = shared.transport.is_host(),
            "runtime started"
        );

        if shared.transport.is_host() {
            shared.inner.lock().synced = true;
            shared.broadcast_snapshot();
        } else if let Some(host) = shared.transport.host_id() {
            shared.send_sync_request(&host);
        }

        Self { shared }
    }

    /// Submits an action.
    ///
    /// On the host the action runs immediately and its patch is broadcast.
    /// On a client it is forwarded to the host. After `destroy` this is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Host: [`RuntimeError::UnknownAction`] or [`RuntimeError::Action`].
    /// Client: [`RuntimeError::Transport`] if forwarding fails.
    pub fn submit_action(&self, name: &str, input: Value, target_id: Option<&str>) -> RuntimeResult<()> {
        if self.shared.inner.lock().phase != Phase::Running {
            return Ok(());
        }
        if self.shared.transport.is_host() {
            let player_id = self.shared.player_id.clone();
            self.shared.execute(name, &input, &player_id, target_id)
        } else {
            self.shared.forward(name, input, target_id)
        }
    }

    /// Deep copy of the current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.shared.inner.lock().state.clone()
    }

    /// Reads the state without copying it.
    ///
    /// `f` runs under the state lock and must not call back into the runtime.
    pub fn with_state<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.shared.inner.lock().state)
    }

    /// Subscribes to state changes.
    pub fn on_change(&self, listener: Arc<ChangeFn>) -> Subscription {
        self.register(&self.shared.listeners.change, listener)
    }

    /// Subscribes to committed (host) or applied (client) patch sets.
    pub fn on_patch(&self, listener: Arc<PatchFn>) -> Subscription {
        self.register(&self.shared.listeners.patch, listener)
    }

    /// Subscribes to game events.
    pub fn on_event(&self, listener: Arc<EventFn>) -> Subscription {
        self.register(&self.shared.listeners.event, listener)
    }

    /// Subscribes to action submissions, local or remote, before they run.
    ///
    /// Fires for every submission this runtime handles, including ones the
    /// handler later rejects.
    pub fn on_submit(&self, listener: Arc<SubmitFn>) -> Subscription {
        self.register(&self.shared.listeners.submit, listener)
    }

    /// Subscribes to committed (host) and forwarded (client) actions.
    pub fn on_action(&self, listener: Arc<ActionFn>) -> Subscription {
        self.register(&self.shared.listeners.action, listener)
    }

    /// Subscribes to desync notifications.
    pub fn on_desync(&self, listener: Arc<DesyncFn>) -> Subscription {
        self.register(&self.shared.listeners.desync, listener)
    }

    fn register<F: ?Sized + Send + Sync + 'static>(&self, set: &HandlerSet<F>, listener: Arc<F>) -> Subscription {
        if self.phase() == Phase::Destroyed {
            return Subscription::noop();
        }
        set.add(listener)
    }

    /// Asks the host for a fresh snapshot. No-op on the host.
    pub fn request_resync(&self) {
        if self.shared.transport.is_host() {
            return;
        }
        if let Some(host) = self.shared.transport.host_id() {
            self.shared.send_sync_request(&host);
        }
    }

    /// Whether this runtime currently holds host authority.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.shared.transport.is_host()
    }

    /// Whether patches are being refused until the next snapshot.
    #[must_use]
    pub fn is_desynced(&self) -> bool {
        self.shared.inner.lock().desynced
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().phase
    }

    /// Host: committed actions and hooks. Client: tick of the last update applied.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.shared.inner.lock().tick
    }

    /// Local player id.
    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.shared.player_id
    }

    /// Game definition this runtime runs.
    #[must_use]
    pub fn definition(&self) -> &GameDefinition {
        &self.shared.definition
    }

    /// Stops the runtime. Transport subscriptions and listeners are
    /// removed; the transport itself stays connected.
    pub fn destroy(&self) {
        let subscriptions = {
            let mut inner = self.shared.inner.lock();
            if inner.phase == Phase::Destroyed {
                return;
            }
            inner.phase = Phase::Destroyed;
            std::mem::take(&mut inner.subscriptions)
        };
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.shared.listeners.clear();
        tracing::info!(player = %self.shared.player_id, "runtime destroyed");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Runtime")
            .field("player_id", &self.shared.player_id)
            .field("phase", &inner.phase)
            .field("tick", &inner.tick)
            .field("desynced", &inner.desynced)
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Wires transport events to this runtime through weak references.
    fn subscribe(this: &Arc<Self>) -> Vec<Subscription> {
        let transport = Arc::clone(&this.transport);
        let on_message = {
            let weak = Arc::downgrade(this);
            transport.on_message(Arc::new(move |message: &WireMessage| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_message(message);
                }
            }))
        };
        let on_join = Self::peer_handler(this, Self::handle_peer_join);
        let on_join = transport.on_peer_join(on_join);
        let on_leave = Self::peer_handler(this, Self::handle_peer_leave);
        let on_leave = transport.on_peer_leave(on_leave);
        let on_host_gone = Self::peer_handler(this, Self::handle_host_disconnect);
        let on_host_gone = transport.on_host_disconnect(on_host_gone);
        let on_host = Self::peer_handler(this, Self::handle_host_change);
        let on_host = transport.on_host_change(on_host);
        vec![on_message, on_join, on_leave, on_host_gone, on_host]
    }

    fn peer_handler(this: &Arc<Self>, handler: fn(&Self, &str)) -> Arc<dyn Fn(&str) + Send + Sync> {
        let weak: Weak<Self> = Arc::downgrade(this);
        Arc::new(move |peer_id: &str| {
            if let Some(shared) = weak.upgrade() {
                handler(&shared, peer_id);
            }
        })
    }

    fn is_running(&self) -> bool {
        self.inner.lock().phase == Phase::Running
    }

    fn send<T: Serialize>(&self, kind: &str, payload: &T, target: Option<&str>) -> Result<(), TransportError> {
        let message = WireMessage::with_payload(kind, payload)?;
        self.transport.send(message, target)
    }

    /// Sends, logging failures. Delivery is fire-and-forget.
    fn send_logged<T: Serialize>(&self, kind: &str, payload: &T, target: Option<&str>) {
        if let Err(err) = self.send(kind, payload, target) {
            tracing::debug!(player = %self.player_id, kind, to = ?target, error = %err, "send failed");
        }
    }

    // -------------------------------------------------------------------
    // Host side
    // -------------------------------------------------------------------

    fn execute(&self, name: &str, input: &Value, player_id: &str, target_id: Option<&str>) -> RuntimeResult<()> {
        self.notify_submit(&ActionRequest { name, input, player_id, target_id, forwarded: false });
        let handler = self
            .definition
            .handler(name)
            .ok_or_else(|| RuntimeError::UnknownAction(name.to_owned()))?;

        let order = self.outbound.lock();
        let started = Instant::now();
        let commit = {
            let mut guard = self.inner.lock();
            if guard.phase != Phase::Running {
                return Ok(());
            }
            let inner = &mut *guard;
            let mut working = inner.state.clone();
            let mut ctx = ActionContext::new(player_id, target_id, true, &mut inner.random, inner.tick + 1);
            handler(&mut working, &mut ctx, input).map_err(|source| RuntimeError::Action {
                name: name.to_owned(),
                source,
            })?;
            let events = ctx.into_events();
            Self::commit(inner, working, events)
        };
        let duration = started.elapsed();

        tracing::debug!(
            player = %self.player_id,
            action = name,
            from = player_id,
            tick = commit.tick,
            patches = commit.patches.len(),
            "action committed"
        );
        self.broadcast_commit(&commit);
        drop(order);

        self.notify_commit(&commit);
        let info = ActionInfo {
            name: name.to_owned(),
            input: input.clone(),
            player_id: player_id.to_owned(),
            target_id: target_id.map(str::to_owned),
            tick: self.inner.lock().tick,
            duration,
            forwarded: false,
        };
        for listener in self.listeners.action.snapshot() {
            listener(&info);
        }
        Ok(())
    }

    fn notify_submit(&self, request: &ActionRequest<'_>) {
        for listener in self.listeners.submit.snapshot() {
            listener(request);
        }
    }

    /// Runs a lifecycle hook as an action with no handler error path.
    fn run_hook(&self, player_id: &str, joined: bool) {
        let order = self.outbound.lock();
        let commit = {
            let mut inner = self.inner.lock();
            if inner.phase != Phase::Running {
                return;
            }
            let mut working = inner.state.clone();
            if joined {
                self.definition.player_joined(&mut working, player_id);
            } else {
                self.definition.player_left(&mut working, player_id);
            }
            Self::commit(&mut inner, working, Vec::new())
        };
        tracing::debug!(player = %self.player_id, peer = player_id, joined, tick = commit.tick, "lifecycle hook committed");
        self.broadcast_commit(&commit);
        drop(order);
        self.notify_commit(&commit);
    }

    /// Diffs `working` against the committed state and adopts it.
    fn commit(inner: &mut Inner, working: State, events: Vec<GameEvent>) -> Commit {
        let patches = generate_diff(&inner.state, &working);
        let base_tick = inner.synced_tick;
        inner.tick += 1;
        inner.state = working;

        let changed = !patches.is_empty();
        if changed {
            inner.synced_tick = inner.tick;
        }
        let snapshot = patches.iter().any(Patch::is_root).then(|| inner.state.clone());
        Commit {
            patches,
            base_tick,
            tick: inner.tick,
            snapshot,
            changed: changed.then(|| inner.state.clone()),
            events,
        }
    }

    fn broadcast_commit(&self, commit: &Commit) {
        if let Some(state) = &commit.snapshot {
            self.send_logged(SNAPSHOT, &SnapshotMessage { state: state.clone(), tick: commit.tick }, None);
        } else if !commit.patches.is_empty() {
            let message = PatchMessage {
                patches: commit.patches.clone(),
                tick: commit.tick,
                base_tick: commit.base_tick,
            };
            self.send_logged(PATCH, &message, None);
        }
        for event in &commit.events {
            self.send_logged(
                EVENT,
                &EventMessage { name: event.name.clone(), data: event.data.clone() },
                None,
            );
        }
    }

    fn notify_commit(&self, commit: &Commit) {
        if !commit.patches.is_empty() {
            for listener in self.listeners.patch.snapshot() {
                listener(&commit.patches, commit.tick);
            }
        }
        if let Some(state) = &commit.changed {
            for listener in self.listeners.change.snapshot() {
                listener(state, commit.tick);
            }
        }
        for event in &commit.events {
            for listener in self.listeners.event.snapshot() {
                listener(event);
            }
        }
    }

    fn snapshot_message(&self) -> SnapshotMessage {
        let inner = self.inner.lock();
        SnapshotMessage { state: inner.state.clone(), tick: inner.synced_tick }
    }

    fn broadcast_snapshot(&self) {
        let _order = self.outbound.lock();
        let snapshot = self.snapshot_message();
        tracing::debug!(player = %self.player_id, tick = snapshot.tick, "broadcasting snapshot");
        self.send_logged(SNAPSHOT, &snapshot, None);
    }

    fn send_snapshot_to(&self, peer_id: &str) {
        let _order = self.outbound.lock();
        let snapshot = self.snapshot_message();
        tracing::debug!(player = %self.player_id, to = peer_id, tick = snapshot.tick, "sending snapshot");
        self.send_logged(SNAPSHOT, &snapshot, Some(peer_id));
    }

    // -------------------------------------------------------------------
    // Client side
    // -------------------------------------------------------------------

    fn forward(&self, name: &str, input: Value, target_id: Option<&str>) -> RuntimeResult<()> {
        self.notify_submit(&ActionRequest {
            name,
            input: &input,
            player_id: &self.player_id,
            target_id,
            forwarded: true,
        });
        let started = Instant::now();
        let host = self.transport.host_id();
        let message = ActionMessage {
            name: name.to_owned(),
            input: input.clone(),
            target_id: target_id.map(str::to_owned),
        };
        self.send(ACTION, &message, host.as_deref())?;

        let info = ActionInfo {
            name: name.to_owned(),
            input,
            player_id: self.player_id.clone(),
            target_id: target_id.map(str::to_owned),
            tick: self.inner.lock().tick,
            duration: started.elapsed(),
            forwarded: true,
        };
        for listener in self.listeners.action.snapshot() {
            listener(&info);
        }
        Ok(())
    }

    fn send_sync_request(&self, host: &str) {
        if host == self.player_id {
            return;
        }
        tracing::debug!(player = %self.player_id, host, "requesting snapshot");
        self.send_logged(SYNC_REQUEST, &SyncRequest {}, Some(host));
    }

    fn apply_patch_message(&self, message: PatchMessage) -> PatchOutcome {
        let mut inner = self.inner.lock();
        if !inner.synced || inner.desynced {
            return PatchOutcome::Ignored;
        }
        if message.base_tick < inner.synced_tick {
            tracing::debug!(player = %self.player_id, base = message.base_tick, at = inner.synced_tick, "stale patch ignored");
            return PatchOutcome::Ignored;
        }
        if message.base_tick > inner.synced_tick {
            inner.desynced = true;
            return PatchOutcome::Desync(format!(
                "missed updates: patch base {} but last applied {}",
                message.base_tick, inner.synced_tick
            ));
        }

        let mut next = inner.state.clone();
        if let Err(err) = apply_patches(&mut next, &message.patches) {
            inner.desynced = true;
            return PatchOutcome::Desync(format!("patch failed at tick {}: {err}", message.tick));
        }
        inner.state = next;
        inner.tick = message.tick;
        inner.synced_tick = message.tick;
        let state = (!self.listeners.change.is_empty()).then(|| inner.state.clone());
        PatchOutcome::Applied { patches: message.patches, tick: message.tick, state }
    }

    fn mark_desynced(&self, reason: &str) {
        tracing::warn!(player = %self.player_id, reason, "desynced, requesting snapshot");
        for listener in self.listeners.desync.snapshot() {
            listener(reason);
        }
        if let Some(host) = self.transport.host_id() {
            self.send_sync_request(&host);
        }
    }

    // -------------------------------------------------------------------
    // Transport callbacks
    // -------------------------------------------------------------------

    fn handle_message(&self, message: &WireMessage) {
        if !self.is_running() {
            return;
        }
        let from_host = self.transport.host_id().as_deref() == Some(message.sender_id.as_str());
        let is_host = self.transport.is_host();

        match message.kind.as_str() {
            PATCH if !is_host && from_host => match message.payload_as::<PatchMessage>() {
                Ok(patch) => self.on_patch_message(patch),
                Err(err) => self.drop_malformed(message, &err),
            },
            SNAPSHOT if !is_host && from_host => match message.payload_as::<SnapshotMessage>() {
                Ok(snapshot) => self.on_snapshot(snapshot),
                Err(err) => self.drop_malformed(message, &err),
            },
            EVENT if !is_host && from_host => match message.payload_as::<EventMessage>() {
                Ok(event) => {
                    let event = GameEvent { name: event.name, data: event.data };
                    for listener in self.listeners.event.snapshot() {
                        listener(&event);
                    }
                }
                Err(err) => self.drop_malformed(message, &err),
            },
            ACTION if is_host => match message.payload_as::<ActionMessage>() {
                Ok(action) => {
                    let result = self.execute(
                        &action.name,
                        &action.input,
                        &message.sender_id,
                        action.target_id.as_deref(),
                    );
                    if let Err(err) = result {
                        tracing::warn!(
                            player = %self.player_id,
                            from = %message.sender_id,
                            action = %action.name,
                            error = %err,
                            "remote action dropped"
                        );
                    }
                }
                Err(err) => self.drop_malformed(message, &err),
            },
            SYNC_REQUEST if is_host => self.send_snapshot_to(&message.sender_id),
            PATCH | SNAPSHOT | EVENT | ACTION | SYNC_REQUEST => {
                tracing::debug!(
                    player = %self.player_id,
                    kind = %message.kind,
                    from = %message.sender_id,
                    "message not for this role ignored"
                );
            }
            _ => {}
        }
    }

    fn drop_malformed(&self, message: &WireMessage, err: &TransportError) {
        tracing::warn!(
            player = %self.player_id,
            kind = %message.kind,
            from = %message.sender_id,
            error = %err,
            "malformed runtime message dropped"
        );
    }

    fn on_patch_message(&self, message: PatchMessage) {
        match self.apply_patch_message(message) {
            PatchOutcome::Applied { patches, tick, state } => {
                for listener in self.listeners.patch.snapshot() {
                    listener(&patches, tick);
                }
                if let Some(state) = state {
                    for listener in self.listeners.change.snapshot() {
                        listener(&state, tick);
                    }
                }
            }
            PatchOutcome::Ignored => {}
            PatchOutcome::Desync(reason) => self.mark_desynced(&reason),
        }
    }

    fn on_snapshot(&self, snapshot: SnapshotMessage) {
        let SnapshotMessage { state, tick } = snapshot;
        let (state, recovered) = {
            let mut inner = self.inner.lock();
            let recovered = inner.desynced;
            inner.state = state;
            inner.tick = tick;
            inner.synced_tick = tick;
            inner.synced = true;
            inner.desynced = false;
            ((!self.listeners.change.is_empty()).then(|| inner.state.clone()), recovered)
        };
        if recovered {
            tracing::info!(player = %self.player_id, tick, "resynced from snapshot");
        } else {
            tracing::debug!(player = %self.player_id, tick, "snapshot applied");
        }
        if let Some(state) = state {
            for listener in self.listeners.change.snapshot() {
                listener(&state, tick);
            }
        }
    }

    fn handle_peer_join(&self, peer_id: &str) {
        if !self.is_running() || !self.transport.is_host() {
            return;
        }
        tracing::info!(player = %self.player_id, peer = peer_id, "player joined");
        self.run_hook(peer_id, true);
        self.send_snapshot_to(peer_id);
    }

    fn handle_peer_leave(&self, peer_id: &str) {
        if !self.is_running() || !self.transport.is_host() {
            return;
        }
        tracing::info!(player = %self.player_id, peer = peer_id, "player left");
        self.run_hook(peer_id, false);
    }

    fn handle_host_disconnect(&self, host_id: &str) {
        if !self.is_running() {
            return;
        }
        tracing::info!(player = %self.player_id, host = host_id, "host disconnected");
        // Already promoted: the leave hook ran when the peer left.
        if !self.transport.is_host() {
            self.inner.lock().departed_host = Some(host_id.to_owned());
        }
    }

    fn handle_host_change(&self, host_id: &str) {
        if !self.is_running() {
            return;
        }
        if host_id != self.player_id {
            tracing::info!(player = %self.player_id, host = host_id, "following new host");
            self.inner.lock().departed_host = None;
            self.send_sync_request(host_id);
            return;
        }

        let departed = {
            let mut inner = self.inner.lock();
            inner.synced = true;
            inner.desynced = false;
            inner.departed_host.take()
        };
        tracing::info!(player = %self.player_id, "promoted to host");
        if let Some(old_host) = departed {
            if old_host != self.player_id {
                self.run_hook(&old_host, false);
            }
        }
        self.broadcast_snapshot();
    }
}
