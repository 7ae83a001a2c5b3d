//! # Runtime Wire Messages
//!
//! Payloads the runtime puts inside [`tether_networking::WireMessage`]
//! envelopes.
//!
//! ```text
//! host   ── patch    {patches, tick, baseTick} ──► clients
//! host   ── snapshot {state, tick}             ──► client(s)
//! host   ── event    {name, data}              ──► clients
//! client ── action   {name, input, targetId?}  ──► host
//! client ── sync_request {}                    ──► host
//! ```
//!
//! `baseTick` is the tick the patch applies on top of. A client only
//! accepts a patch whose `baseTick` equals the tick it last applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{Patch, State};

/// Message type of [`PatchMessage`].
pub const PATCH: &str = "patch";
/// Message type of [`SnapshotMessage`].
pub const SNAPSHOT: &str = "snapshot";
/// Message type of [`ActionMessage`].
pub const ACTION: &str = "action";
/// Message type of [`SyncRequest`].
pub const SYNC_REQUEST: &str = "sync_request";
/// Message type of [`EventMessage`].
pub const EVENT: &str = "event";

/// Incremental state update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMessage {
    /// Ordered patches.
    pub patches: Vec<Patch>,
    /// Tick after applying.
    pub tick: u64,
    /// Tick the patches apply on top of.
    pub base_tick: u64,
}

/// Whole-state replacement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    /// Full state.
    pub state: State,
    /// Tick of this state.
    pub tick: u64,
}

/// Action forwarded from a client to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    /// Action name.
    pub name: String,
    /// Action input.
    #[serde(default)]
    pub input: Value,
    /// Optional target named by the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// Client asks the host for a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {}

/// Game event broadcast by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name.
    pub name: String,
    /// Event body.
    #[serde(default)]
    pub data: Value,
}
