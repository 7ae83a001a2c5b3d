//! Property test for the diff engine: random trees, random edits, and the
//! patches must always rebuild the edited tree from a copy of the original.

use serde_json::{json, Map, Value};
use tether_core::{apply_patches, generate_diff, DeterministicRandom, PatchOp};

fn random_leaf(rng: &mut DeterministicRandom) -> Value {
    match rng.range_i64(0, 4) {
        0 => Value::Null,
        1 => json!(rng.chance(0.5)),
        2 => json!(rng.range_i64(-50, 50)),
        3 => json!(rng.range_f64(-1.0, 1.0)),
        _ => json!(format!("s{}", rng.range_i64(0, 9))),
    }
}

fn random_tree(rng: &mut DeterministicRandom, depth: u32) -> Value {
    if depth == 0 || rng.chance(0.3) {
        return random_leaf(rng);
    }
    if rng.chance(0.5) {
        let len = rng.range_i64(0, 4);
        Value::Array((0..len).map(|_| random_tree(rng, depth - 1)).collect())
    } else {
        let mut map = Map::new();
        for _ in 0..rng.range_i64(0, 4) {
            map.insert(format!("k{}", rng.range_i64(0, 6)), random_tree(rng, depth - 1));
        }
        Value::Object(map)
    }
}

/// Rewrites a random share of the nodes, keeping the rest.
fn mutate(value: &Value, rng: &mut DeterministicRandom, depth: u32) -> Value {
    if rng.chance(0.15) {
        return random_tree(rng, depth);
    }
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(|v| mutate(v, rng, depth.saturating_sub(1))).collect();
            if rng.chance(0.2) {
                items.push(random_leaf(rng));
            }
            Value::Array(items)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                if !rng.chance(0.2) {
                    out.insert(key.clone(), mutate(v, rng, depth.saturating_sub(1)));
                }
            }
            if rng.chance(0.3) {
                out.insert(format!("n{}", rng.range_i64(0, 6)), random_tree(rng, depth));
            }
            Value::Object(out)
        }
        other => {
            if rng.chance(0.3) {
                random_leaf(rng)
            } else {
                other.clone()
            }
        }
    }
}

#[test]
fn test_random_round_trips() {
    let mut rng = DeterministicRandom::new(0xD1FF);

    for case in 0..500 {
        // Root is always a map: root replacement goes through snapshots.
        let mut old = Map::new();
        old.insert("root".into(), random_tree(&mut rng, 4));
        let old = Value::Object(old);
        let mut new = mutate(&old, &mut rng, 4);
        if !new.is_object() {
            new = json!({ "root": new });
        }

        let patches = generate_diff(&old, &new);
        let mut mirror = old.clone();
        apply_patches(&mut mirror, &patches)
            .unwrap_or_else(|e| panic!("case {case}: {e} for {patches:?}"));
        assert!(
            tether_core::values_equal(&mirror, &new),
            "case {case}: mirror {mirror} != {new}"
        );
    }
}

#[test]
fn test_no_op_diff_is_empty() {
    let mut rng = DeterministicRandom::new(7);
    for _ in 0..100 {
        let tree = json!({ "root": random_tree(&mut rng, 5) });
        assert!(generate_diff(&tree, &tree).is_empty());
    }
}

#[test]
fn test_items_length_change_is_single_replace() {
    let old = json!({ "items": [1, 2, 3], "other": { "a": 1 } });
    let new = json!({ "items": [1, 2], "other": { "a": 1 } });

    let patches = generate_diff(&old, &new);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].op, PatchOp::Replace);
    assert_eq!(patches[0].path, vec!["items".to_owned()]);
}

#[test]
fn test_large_integer_changes_survive_round_trip() {
    let cases = [
        (json!({ "seed": 9_007_199_254_740_992_u64 }), json!({ "seed": 9_007_199_254_740_993_u64 })),
        (json!({ "hash": u64::MAX }), json!({ "hash": u64::MAX - 1 })),
        (json!({ "at": [i64::MIN] }), json!({ "at": [i64::MIN + 1] })),
    ];
    for (old, new) in cases {
        let patches = generate_diff(&old, &new);
        assert_eq!(patches.len(), 1, "{old} -> {new}");

        let mut mirror = old.clone();
        apply_patches(&mut mirror, &patches).unwrap();
        assert_eq!(mirror, new);
    }
}
