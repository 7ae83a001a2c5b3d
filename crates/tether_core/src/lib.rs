//! # TETHER Core Engine
//!
//! Pure state-tree machinery shared by hosts and clients:
//! - Structural diff between two state snapshots
//! - Patch application against a live state tree
//! - Seeded random for reproducible game logic
//!
//! ## Architecture Rules
//!
//! 1. **State is a plain value tree** - maps, sequences and scalars, nothing else
//! 2. **Diffs are flat** - one ordered list of patches per state transition
//! 3. **No I/O** - every function here is deterministic
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use tether_core::{apply_patches, generate_diff};
//!
//! let old = json!({ "counter": 0 });
//! let new = json!({ "counter": 1 });
//!
//! let patches = generate_diff(&old, &new);
//! let mut mirror = old.clone();
//! apply_patches(&mut mirror, &patches).unwrap();
//! assert_eq!(mirror, new);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod diff;
pub mod error;
pub mod patch;
pub mod random;
pub mod value;

pub use diff::{generate_diff, generate_diff_at};
pub use error::{PatchError, PatchResult};
pub use patch::{apply_patch, apply_patches, Patch, PatchOp};
pub use random::DeterministicRandom;
pub use value::{kind_of, values_equal, State, ValueKind};
