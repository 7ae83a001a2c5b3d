//! # Game Definitions
//!
//! A game is a setup function plus named action handlers:
//!
//! ```rust
//! use serde_json::json;
//! use tether::{ActionError, GameDefinition};
//!
//! let game = GameDefinition::new(|_ctx| json!({ "counter": 0 }))
//!     .action("increment", |state, _ctx, _input| {
//!         let counter = state["counter"].as_i64().ok_or_else(|| ActionError::rejected("no counter"))?;
//!         state["counter"] = json!(counter + 1);
//!         Ok(())
//!     });
//! assert!(game.has_action("increment"));
//! ```
//!
//! Handlers mutate a working copy. The runtime diffs it against the last
//! committed state, so handlers never build patches themselves.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tether_core::State;

use crate::context::{ActionContext, SetupContext};
use crate::error::ActionError;
use crate::players::PlayerRoster;

/// Builds the initial state.
pub type SetupFn = dyn Fn(&mut SetupContext<'_>) -> State + Send + Sync;

/// Applies one action: `(state, ctx, input)`.
pub type ActionHandler =
    dyn Fn(&mut State, &mut ActionContext<'_>, &Value) -> Result<(), ActionError> + Send + Sync;

/// Player lifecycle hook: `(state, player_id)`.
pub type PlayerHook = dyn Fn(&mut State, &str) + Send + Sync;

/// Setup, actions and lifecycle hooks of one game.
pub struct GameDefinition {
    setup: Box<SetupFn>,
    actions: HashMap<String, Box<ActionHandler>>,
    on_player_join: Option<Box<PlayerHook>>,
    on_player_leave: Option<Box<PlayerHook>>,
    roster: Option<PlayerRoster>,
}

impl GameDefinition {
    /// Creates a definition with no actions.
    pub fn new(setup: impl Fn(&mut SetupContext<'_>) -> State + Send + Sync + 'static) -> Self {
        Self {
            setup: Box::new(setup),
            actions: HashMap::new(),
            on_player_join: None,
            on_player_leave: None,
            roster: None,
        }
    }

    /// Registers an action handler. A later registration replaces an
    /// earlier one with the same name.
    #[must_use]
    pub fn action(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&mut State, &mut ActionContext<'_>, &Value) -> Result<(), ActionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Box::new(handler));
        self
    }

    /// Runs on the host when a peer joins.
    #[must_use]
    pub fn on_player_join(mut self, hook: impl Fn(&mut State, &str) + Send + Sync + 'static) -> Self {
        self.on_player_join = Some(Box::new(hook));
        self
    }

    /// Runs on the host when a peer leaves.
    #[must_use]
    pub fn on_player_leave(mut self, hook: impl Fn(&mut State, &str) + Send + Sync + 'static) -> Self {
        self.on_player_leave = Some(Box::new(hook));
        self
    }

    /// Maintains a [`PlayerRoster`] automatically.
    ///
    /// Setup seeds the roster with every known player; joins and leaves
    /// update it before the matching hook runs.
    #[must_use]
    pub fn with_roster(mut self, roster: PlayerRoster) -> Self {
        self.roster = Some(roster);
        self
    }

    /// Returns true if an action is registered under `name`.
    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted.
    #[must_use]
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The roster, if one is attached.
    #[must_use]
    pub fn roster(&self) -> Option<&PlayerRoster> {
        self.roster.as_ref()
    }

    pub(crate) fn handler(&self, name: &str) -> Option<&ActionHandler> {
        self.actions.get(name).map(Box::as_ref)
    }

    pub(crate) fn run_setup(&self, ctx: &mut SetupContext<'_>) -> State {
        let mut state = (self.setup)(ctx);
        if let Some(roster) = &self.roster {
            let players = roster.setup(&ctx.all_players());
            if let Some(root) = state.as_object_mut() {
                root.insert(roster.key().to_owned(), players);
            }
        }
        state
    }

    pub(crate) fn player_joined(&self, state: &mut State, player_id: &str) {
        if let Some(roster) = &self.roster {
            roster.join(state, player_id);
        }
        if let Some(hook) = &self.on_player_join {
            hook(state, player_id);
        }
    }

    pub(crate) fn player_left(&self, state: &mut State, player_id: &str) {
        if let Some(roster) = &self.roster {
            roster.leave(state, player_id);
        }
        if let Some(hook) = &self.on_player_leave {
            hook(state, player_id);
        }
    }
}

impl fmt::Debug for GameDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameDefinition")
            .field("actions", &self.action_names())
            .field("roster", &self.roster)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::DeterministicRandom;

    #[test]
    fn test_setup_seeds_roster() {
        let game = GameDefinition::new(|_| json!({ "round": 1 }))
            .with_roster(PlayerRoster::new("players", |i, _| json!({ "slot": i })));
        let mut random = DeterministicRandom::new(1);
        let peers = vec!["b".to_owned()];
        let mut ctx = SetupContext { player_id: "a", peer_ids: &peers, random: &mut random };

        let state = game.run_setup(&mut ctx);
        assert_eq!(state, json!({ "round": 1, "players": { "a": { "slot": 0 }, "b": { "slot": 1 } } }));
    }

    #[test]
    fn test_hooks_run_after_roster() {
        let game = GameDefinition::new(|_| json!({}))
            .with_roster(PlayerRoster::new("players", |_, id| json!(id)))
            .on_player_join(|state, id| {
                let count = state["players"].as_object().map_or(0, serde_json::Map::len);
                state["last_join"] = json!({ "id": id, "count": count });
            });
        let mut state = json!({});
        game.player_joined(&mut state, "c");
        assert_eq!(state["last_join"], json!({ "id": "c", "count": 1 }));

        game.player_left(&mut state, "c");
        assert_eq!(state["players"], json!({}));
    }

    #[test]
    fn test_action_lookup() {
        let game = GameDefinition::new(|_| json!({}))
            .action("b", |_, _, _| Ok(()))
            .action("a", |_, _, _| Err(ActionError::rejected("nope")));
        assert_eq!(game.action_names(), vec!["a", "b"]);
        assert!(game.handler("missing").is_none());
    }
}
