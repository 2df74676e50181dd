//! Stable structural content hashing for raw contract documents.
//!
//! Identity everywhere in the engine is the SHA-256 of a canonical rendering
//! of a document: object keys in sorted order, array elements in declared
//! order. Two documents that differ only in object key ordering hash
//! identically; reordering an array changes the hash.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Renders `value` as canonical JSON: objects with sorted keys, arrays in
/// element order, scalars via serde_json's standard formatting.
fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, entry)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                canonicalize(entry, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Computes the structural content hash of a raw document.
///
/// The hash is a pure function of the document's structure: key order is
/// irrelevant, array order is significant.
pub fn hash_object(value: &Value) -> String {
    let mut canonical = String::new();
    canonicalize(value, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deep structural equality of two documents.
///
/// serde_json object maps compare as unordered key/value sets, which is
/// exactly the equality the content hash encodes.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    a == b
}
