//! # Patch Application
//!
//! A patch is one structural edit at a path inside the state tree.
//!
//! ## Wire Format
//!
//! ```text
//! { "op": "add" | "replace" | "remove", "path": ["players", "p1", "hp"], "value": 90 }
//! ```
//!
//! ## Application Rules
//!
//! - Missing intermediate map keys are created as empty maps
//! - Array segments must be in-bounds indices
//! - `remove` on an array splices, so later indices shift
//! - The root (empty path) is never patched in place

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{PatchError, PatchResult};

/// Operation carried by a [`Patch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Create a key (or overwrite it).
    Add,
    /// Overwrite an existing value.
    Replace,
    /// Delete a map key or splice an array element.
    Remove,
}

/// A single structural edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// What to do at the target.
    pub op: PatchOp,
    /// Keys from the root to the target. Array indices are decimal strings.
    pub path: Vec<String>,
    /// New value for `add` and `replace`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub value: Option<Value>,
}

/// Keeps an explicit `"value": null` as `Some(Value::Null)`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Patch {
    /// Creates an `add` patch.
    #[must_use]
    pub fn add(path: Vec<String>, value: Value) -> Self {
        Self { op: PatchOp::Add, path, value: Some(value) }
    }

    /// Creates a `replace` patch.
    #[must_use]
    pub fn replace(path: Vec<String>, value: Value) -> Self {
        Self { op: PatchOp::Replace, path, value: Some(value) }
    }

    /// Creates a `remove` patch.
    #[must_use]
    pub fn remove(path: Vec<String>) -> Self {
        Self { op: PatchOp::Remove, path, value: None }
    }

    /// Returns true if this patch targets the root.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

/// Applies a single patch to `state` in place.
///
/// # Errors
///
/// Returns [`PatchError::EmptyPath`] for root patches, and the other
/// [`PatchError`] variants when the path does not fit the current tree.
/// On error the tree may hold intermediate maps created along the path;
/// callers that need atomicity apply to a copy.
pub fn apply_patch(state: &mut Value, patch: &Patch) -> PatchResult<()> {
    let Some((last, parents)) = patch.path.split_last() else {
        return Err(PatchError::EmptyPath);
    };

    let mut cursor = state;
    for (depth, segment) in parents.iter().enumerate() {
        cursor = step_into(cursor, segment, &patch.path[..depth])?;
    }

    match patch.op {
        PatchOp::Add | PatchOp::Replace => {
            let value = patch
                .value
                .clone()
                .ok_or_else(|| PatchError::MissingValue { path: patch.path.clone() })?;
            assign(cursor, last, value, parents)
        }
        PatchOp::Remove => remove(cursor, last, parents),
    }
}

/// Applies patches in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`PatchError`] encountered.
pub fn apply_patches(state: &mut Value, patches: &[Patch]) -> PatchResult<()> {
    patches.iter().try_for_each(|patch| apply_patch(state, patch))
}

/// Walks one segment down, creating an empty map for a missing map key.
fn step_into<'a>(cursor: &'a mut Value, segment: &str, path: &[String]) -> PatchResult<&'a mut Value> {
    match cursor {
        Value::Object(map) => Ok(map
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            let len = items.len();
            items.get_mut(index).ok_or_else(|| PatchError::IndexOutOfBounds {
                path: path.to_vec(),
                index,
                len,
            })
        }
        _ => Err(PatchError::NotAContainer { path: path.to_vec() }),
    }
}

fn assign(container: &mut Value, key: &str, value: Value, path: &[String]) -> PatchResult<()> {
    match container {
        Value::Object(map) => {
            map.insert(key.to_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(key, path)?;
            let len = items.len();
            if index < len {
                items[index] = value;
            } else if index == len {
                items.push(value);
            } else {
                return Err(PatchError::IndexOutOfBounds { path: path.to_vec(), index, len });
            }
            Ok(())
        }
        _ => Err(PatchError::NotAContainer { path: path.to_vec() }),
    }
}

fn remove(container: &mut Value, key: &str, path: &[String]) -> PatchResult<()> {
    match container {
        Value::Object(map) => {
            map.shift_remove(key);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(key, path)?;
            let len = items.len();
            if index >= len {
                return Err(PatchError::IndexOutOfBounds { path: path.to_vec(), index, len });
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer { path: path.to_vec() }),
    }
}

fn parse_index(segment: &str, path: &[String]) -> PatchResult<usize> {
    segment.parse().map_err(|_| PatchError::InvalidIndex {
        path: path.to_vec(),
        segment: segment.to_owned(),
    })
}
