//! Contexts handed to game logic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::DeterministicRandom;

/// A named event emitted by game logic and broadcast by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Event name.
    pub name: String,
    /// Event body.
    pub data: Value,
}

/// Passed to action handlers while they run on the host.
pub struct ActionContext<'a> {
    /// Player that submitted the action.
    pub player_id: &'a str,
    /// Optional target the submitter named.
    pub target_id: Option<&'a str>,
    /// Always true when run by a runtime; handlers only run on the host.
    pub is_host: bool,
    /// Session random stream.
    pub random: &'a mut DeterministicRandom,
    /// Tick this action commits as.
    pub tick: u64,
    events: Vec<GameEvent>,
}

impl<'a> ActionContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(
        player_id: &'a str,
        target_id: Option<&'a str>,
        is_host: bool,
        random: &'a mut DeterministicRandom,
        tick: u64,
    ) -> Self {
        Self { player_id, target_id, is_host, random, tick, events: Vec::new() }
    }

    /// Queues an event. Events are broadcast only if the action succeeds.
    pub fn emit(&mut self, name: impl Into<String>, data: Value) {
        self.events.push(GameEvent { name: name.into(), data });
    }

    /// Events queued so far.
    #[must_use]
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Consumes the context, returning its events.
    #[must_use]
    pub fn into_events(self) -> Vec<GameEvent> {
        self.events
    }
}

/// Passed to the setup function when a runtime starts.
pub struct SetupContext<'a> {
    /// Local player.
    pub player_id: &'a str,
    /// Other peers known at startup.
    pub peer_ids: &'a [String],
    /// Session random stream.
    pub random: &'a mut DeterministicRandom,
}

impl SetupContext<'_> {
    /// Local player followed by every known peer.
    #[must_use]
    pub fn all_players(&self) -> Vec<String> {
        std::iter::once(self.player_id.to_owned())
            .chain(self.peer_ids.iter().cloned())
            .collect()
    }
}
