//! # TETHER - The Session Runtime
//!
//! Host-authoritative state synchronization for small multiplayer sessions.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────┐  action   ┌──────────────┐  patch/snapshot  ┌──────────────┐
//!   │ Client       │ ────────► │ Host         │ ───────────────► │ Client       │
//!   │ Runtime      │           │ Runtime      │                  │ Runtime      │
//!   │ (mirror)     │ ◄──────── │ handler +    │                  │ (mirror)     │
//!   └──────────────┘  patches  │ diff-on-exit │                  └──────────────┘
//!                              └──────────────┘
//! ```
//!
//! - **Game logic** is a [`GameDefinition`]: a setup function plus named
//!   action handlers that mutate a plain JSON state tree
//! - **The host** runs handlers, diffs the result and broadcasts patches
//! - **Clients** forward actions and apply patches in tick order; any gap
//!   or failed patch triggers a snapshot request
//! - **Transports** are injected; see [`tether_networking`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use tether::{GameDefinition, Runtime, RuntimeConfig};
//! use tether::networking::{LocalRegistry, LocalTransport, Transport};
//!
//! let game = || {
//!     GameDefinition::new(|_| json!({ "counter": 0 })).action("increment", |state, _, _| {
//!         state["counter"] = json!(state["counter"].as_i64().unwrap_or(0) + 1);
//!         Ok(())
//!     })
//! };
//!
//! let registry = LocalRegistry::new();
//! let a: Arc<dyn Transport> = Arc::new(LocalTransport::join(&registry, "r1", "a").unwrap());
//! let b: Arc<dyn Transport> = Arc::new(LocalTransport::join(&registry, "r1", "b").unwrap());
//! let host = Runtime::new(game(), a, RuntimeConfig::default());
//! let client = Runtime::new(game(), b, RuntimeConfig::default());
//!
//! client.submit_action("increment", Value::Null, None).unwrap();
//! assert_eq!(host.state(), json!({ "counter": 1 }));
//! assert_eq!(client.state(), json!({ "counter": 1 }));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod error;
pub mod game;
pub mod inspector;
pub mod messages;
pub mod players;
pub mod runtime;

// Re-exports for convenience
pub use config::{RuntimeConfig, SessionConfig};
pub use context::{ActionContext, GameEvent, SetupContext};
pub use error::{ActionError, ConfigError, RuntimeError, RuntimeResult};
pub use game::GameDefinition;
pub use inspector::{ActionRecord, Inspector, InspectorConfig, StateSnapshot};
pub use players::PlayerRoster;
pub use runtime::{ActionInfo, ActionRequest, Phase, Runtime};

pub use tether_core as core;
pub use tether_networking as networking;

pub use tether_core::{DeterministicRandom, Patch, PatchOp, State};
pub use tether_networking::{Subscription, Transport};
