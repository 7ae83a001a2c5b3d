//! # State Values
//!
//! The state tree is a `serde_json::Value`: a tagged variant over
//! null, bool, number, string, sequence and map. Map key order is preserved
//! (`preserve_order`), so diffs come out in insertion order on every peer.

use serde_json::{Number, Value};

/// A complete game state tree.
pub type State = Value;

/// Runtime shape of a value, used by the diff engine to decide between
/// recursing and replacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `null` / absent.
    Null,
    /// `true` / `false`.
    Bool,
    /// Any number, integer or float.
    Number,
    /// UTF-8 string.
    String,
    /// Ordered sequence.
    Array,
    /// Keyed map.
    Object,
}

/// Returns the kind of a value.
#[inline]
#[must_use]
pub const fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

/// Deep structural equality with numeric comparison for numbers.
///
/// `serde_json` distinguishes `1` from `1.0`; game logic does not, so the
/// diff engine must not emit patches for that difference.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (as_integer(x), as_integer(y)) {
                (Some(x), Some(y)) => x == y,
                // Floats only compare through f64 when one side is not an integer.
                _ => matches!((x.as_f64(), y.as_f64()), (Some(x), Some(y)) if x == y),
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => a == b,
    }
}

/// Exact integer value, covering the full `i64` and `u64` ranges.
fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}
