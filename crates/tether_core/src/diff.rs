//! # Structural Diff
//!
//! Turns two state trees into an ordered list of patches.
//!
//! ## Algorithm
//!
//! ```text
//! kinds differ / primitives differ  ->  replace at path, stop
//! new is sequence, length changed   ->  replace whole sequence
//! new is sequence, same length      ->  recurse per index ("0", "1", ...)
//! new is map                        ->  remove dropped keys,
//!                                       add new keys / recurse shared keys
//! equal primitives                  ->  nothing
//! ```
//!
//! Sequences whose length changes are replaced wholesale. Reordering an
//! array therefore costs one patch per moved element (same length) or one
//! full replace (different length); minimal edit scripts are not attempted.

use serde_json::Value;

use crate::patch::Patch;
use crate::value::{kind_of, values_equal};

/// Computes the patches that turn `old` into `new`.
///
/// Returns an empty list when the trees are structurally equal.
#[must_use]
pub fn generate_diff(old: &Value, new: &Value) -> Vec<Patch> {
    generate_diff_at(old, new, &[])
}

/// Computes the patches that turn `old` into `new`, with every patch path
/// prefixed by `path`.
#[must_use]
pub fn generate_diff_at(old: &Value, new: &Value, path: &[String]) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut cursor = path.to_vec();
    diff_into(old, new, &mut cursor, &mut patches);
    patches
}

fn diff_into(old: &Value, new: &Value, path: &mut Vec<String>, out: &mut Vec<Patch>) {
    match (old, new) {
        (Value::Array(before), Value::Array(after)) => {
            if before.len() != after.len() {
                out.push(Patch::replace(path.clone(), new.clone()));
                return;
            }
            for (index, (a, b)) in before.iter().zip(after).enumerate() {
                path.push(index.to_string());
                diff_into(a, b, path, out);
                path.pop();
            }
        }
        (Value::Object(before), Value::Object(after)) => {
            for key in before.keys().filter(|key| !after.contains_key(*key)) {
                path.push(key.clone());
                out.push(Patch::remove(path.clone()));
                path.pop();
            }
            for (key, b) in after {
                path.push(key.clone());
                match before.get(key) {
                    Some(a) => diff_into(a, b, path, out),
                    None => out.push(Patch::add(path.clone(), b.clone())),
                }
                path.pop();
            }
        }
        _ => {
            if kind_of(old) != kind_of(new) || !values_equal(old, new) {
                out.push(Patch::replace(path.clone(), new.clone()));
            }
        }
    }
}
