//! # Player Roster
//!
//! Keeps one state slice per player under a single key:
//!
//! ```text
//! state["players"] = {
//!     "alice": spawn(0, "alice"),
//!     "bob":   spawn(1, "bob"),
//! }
//! ```
//!
//! The spawn index is the roster size at insertion time, so spawn points
//! line up with join order.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tether_core::State;

/// Builds the initial slice for a player: `(index, player_id) -> value`.
pub type SpawnFn = dyn Fn(usize, &str) -> Value + Send + Sync;

/// Maps player ids to per-player state slices.
#[derive(Clone)]
pub struct PlayerRoster {
    key: String,
    spawn: Arc<SpawnFn>,
}

impl PlayerRoster {
    /// Creates a roster stored under `state[key]`.
    pub fn new(key: impl Into<String>, spawn: impl Fn(usize, &str) -> Value + Send + Sync + 'static) -> Self {
        Self { key: key.into(), spawn: Arc::new(spawn) }
    }

    /// State key holding the roster.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Builds the roster map for an initial set of players.
    #[must_use]
    pub fn setup(&self, ids: &[String]) -> Value {
        let mut roster = Map::new();
        for id in ids {
            if !roster.contains_key(id) {
                let index = roster.len();
                roster.insert(id.clone(), (self.spawn)(index, id));
            }
        }
        Value::Object(roster)
    }

    /// Adds a player. Returns false if the player was already present or
    /// the state has no room for a roster.
    pub fn join(&self, state: &mut State, player_id: &str) -> bool {
        let Some(roster) = self.slots_mut(state) else {
            return false;
        };
        if roster.contains_key(player_id) {
            return false;
        }
        let index = roster.len();
        roster.insert(player_id.to_owned(), (self.spawn)(index, player_id));
        true
    }

    /// Removes a player, returning its slice.
    pub fn leave(&self, state: &mut State, player_id: &str) -> Option<Value> {
        state
            .get_mut(&self.key)
            .and_then(Value::as_object_mut)
            .and_then(|roster| roster.shift_remove(player_id))
    }

    /// Player ids in roster order.
    #[must_use]
    pub fn players(&self, state: &State) -> Vec<String> {
        state
            .get(&self.key)
            .and_then(Value::as_object)
            .map(|roster| roster.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A player's slice.
    #[must_use]
    pub fn get<'s>(&self, state: &'s State, player_id: &str) -> Option<&'s Value> {
        state.get(&self.key).and_then(|roster| roster.get(player_id))
    }

    fn slots_mut<'s>(&self, state: &'s mut State) -> Option<&'s mut Map<String, Value>> {
        let root = state.as_object_mut()?;
        let slot = root
            .entry(self.key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        slot.as_object_mut()
    }
}

impl fmt::Debug for PlayerRoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerRoster").field("key", &self.key).finish_non_exhaustive()
    }
}
