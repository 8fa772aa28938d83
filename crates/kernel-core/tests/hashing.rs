// crates/kernel-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Verifies RFC 8785 canonical JSON hashing behavior.
// ============================================================================
//! ## Overview
//! Ensures canonical JSON hashing is deterministic across key ordering and
//! that hex round-tripping is lossless.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use kernel_core::core::hash_bytes;
use kernel_core::core::hash_value;
use kernel_core::core::HashDigest;
use serde_json::json;

#[test]
fn canonical_hash_is_order_independent_for_maps() {
    let mut map_a = BTreeMap::new();
    map_a.insert("b", json!(2));
    map_a.insert("a", json!(1));

    let map_b: BTreeMap<&str, serde_json::Value> = [("a", json!(1)), ("b", json!(2))].into_iter().collect();

    let hash_a = hash_value(&map_a).expect("hash a");
    let hash_b = hash_value(&map_b).expect("hash b");
    assert_eq!(hash_a, hash_b);
}

#[test]
fn different_content_hashes_differently() {
    let a = hash_value(&json!({"step": "build"})).expect("hash a");
    let b = hash_value(&json!({"step": "test"})).expect("hash b");
    assert_ne!(a, b);
}

#[test]
fn hash_of_known_bytes_is_64_lowercase_hex_chars() {
    let digest = hash_bytes(b"test");
    let hex = digest.to_hex();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn empty_input_hashes_differently_from_nonempty() {
    assert_ne!(hash_bytes(b""), hash_bytes(b"x"));
}

#[test]
fn hex_round_trips_through_serde() {
    let digest = hash_bytes(b"round trip me");
    let json = serde_json::to_string(&digest).expect("serialize");
    let back: HashDigest = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, digest);
}

#[test]
fn hash_is_deterministic_across_calls() {
    let value = json!({"a": 1, "b": [1, 2, 3], "c": {"nested": true}});
    let first = hash_value(&value).expect("hash 1");
    let second = hash_value(&value).expect("hash 2");
    assert_eq!(first, second);
}

proptest::proptest! {
    #[test]
    fn hash_ignores_any_permutation_of_top_level_keys(
        a in 0i64..1_000,
        b in 0i64..1_000,
        c in 0i64..1_000,
    ) {
        let forward = json!({"a": a, "b": b, "c": c});
        let reordered = json!({"c": c, "a": a, "b": b});
        let hash_forward = hash_value(&forward).expect("hash forward");
        let hash_reordered = hash_value(&reordered).expect("hash reordered");
        proptest::prop_assert_eq!(hash_forward, hash_reordered);
    }

    #[test]
    fn distinct_scalars_never_collide(a in 0i64..10_000, b in 0i64..10_000) {
        proptest::prop_assume!(a != b);
        let hash_a = hash_value(&json!({"value": a})).expect("hash a");
        let hash_b = hash_value(&json!({"value": b})).expect("hash b");
        proptest::prop_assert_ne!(hash_a, hash_b);
    }
}
