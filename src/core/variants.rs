//! Variant expansion for raw contract documents.
//!
//! A raw document carrying a `variants` array expands into one fully merged
//! document per variant: the base (minus the `variants` key) merged with the
//! variant's overrides. Arrays concatenate (base entries first), nested
//! objects merge recursively, scalars override. A variant that itself
//! declares `variants` expands recursively.

use crate::core::error::{CovenantError, Result};
use serde_json::{Map, Value};

fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in overlay_map {
                let entry = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            let mut joined = base_items.clone();
            joined.extend(overlay_items.iter().cloned());
            Value::Array(joined)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Expands a raw document's `variants` declaration into N merged documents.
/// A document without `variants` yields itself unchanged.
pub fn expand(raw: &Value) -> Result<Vec<Value>> {
    let Some(map) = raw.as_object() else {
        return Err(CovenantError::InvalidContract(format!(
            "variant expansion requires an object, got {raw}"
        )));
    };
    let Some(variants) = map.get("variants") else {
        return Ok(vec![raw.clone()]);
    };
    let Some(variant_list) = variants.as_array() else {
        return Err(CovenantError::InvalidContract(
            "variants must be an array".to_string(),
        ));
    };

    let mut base = map.clone();
    base.remove("variants");
    let base = Value::Object(base);

    let mut expanded = Vec::new();
    for variant in variant_list {
        let merged = merge(&base, variant);
        expanded.extend(expand(&merged)?);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_variants_yields_self() {
        let raw = json!({ "type": "sw.os", "slug": "debian" });
        assert_eq!(expand(&raw).unwrap(), vec![raw]);
    }

    #[test]
    fn test_scalar_fields_override() {
        let raw = json!({
            "type": "sw.os",
            "slug": "debian",
            "variants": [
                { "version": "10" },
                { "version": "11", "slug": "debian-next" }
            ]
        });
        let expanded = expand(&raw).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0]["slug"], "debian");
        assert_eq!(expanded[0]["version"], "10");
        assert_eq!(expanded[1]["slug"], "debian-next");
        assert_eq!(expanded[1]["version"], "11");
        assert!(expanded[0].get("variants").is_none());
    }

    #[test]
    fn test_array_fields_concatenate() {
        let raw = json!({
            "type": "sw.os",
            "slug": "debian",
            "requires": [{ "type": "arch.sw" }],
            "variants": [
                { "requires": [{ "type": "hw.device-type" }] }
            ]
        });
        let expanded = expand(&raw).unwrap();
        let requires = expanded[0]["requires"].as_array().unwrap();
        assert_eq!(requires.len(), 2);
        assert_eq!(requires[0]["type"], "arch.sw");
        assert_eq!(requires[1]["type"], "hw.device-type");
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let raw = json!({
            "type": "sw.os",
            "slug": "debian",
            "data": { "kernel": "4.19", "libc": "glibc" },
            "variants": [
                { "data": { "kernel": "5.10" } }
            ]
        });
        let expanded = expand(&raw).unwrap();
        assert_eq!(expanded[0]["data"]["kernel"], "5.10");
        assert_eq!(expanded[0]["data"]["libc"], "glibc");
    }

    #[test]
    fn test_nested_variants_recurse() {
        let raw = json!({
            "type": "sw.os",
            "slug": "debian",
            "variants": [
                {
                    "version": "10",
                    "variants": [
                        { "data": { "flavour": "minimal" } },
                        { "data": { "flavour": "full" } }
                    ]
                },
                { "version": "11" }
            ]
        });
        let expanded = expand(&raw).unwrap();
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0]["data"]["flavour"], "minimal");
        assert_eq!(expanded[1]["data"]["flavour"], "full");
        assert_eq!(expanded[2]["version"], "11");
    }

    #[test]
    fn test_non_object_input_fails() {
        assert!(expand(&json!([1, 2])).is_err());
        assert!(expand(&json!({ "type": "sw.os", "variants": 3 })).is_err());
    }
}
