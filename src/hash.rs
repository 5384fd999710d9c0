//! Canonical-JSON serialization and SHA-256 hashing (C5).
//!
//! Canonical form: sorted object keys, no insignificant whitespace,
//! UTF-8. `serde_json::Value::Object` is backed by a `BTreeMap` when the
//! `preserve_order` feature is off, but this crate does not depend on
//! that feature flag being absent upstream, so keys are sorted
//! explicitly before serializing.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys and re-serialize compactly.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize a value to canonical compact JSON bytes.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).expect("Value serialization never fails")
}

/// SHA-256 hex digest of a value's canonical JSON form.
pub fn payload_hash(value: &Value) -> String {
    let bytes = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_bytes());
    format!("{:x}", hasher.finalize())
}
