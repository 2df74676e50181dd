//! Codec between a contract's children index and the nested `raw.children`
//! representation.
//!
//! The serialized form nests along the dotted type namespace: a type
//! `arch.sw` lands under `{"arch": {"sw": ...}}`. A type with exactly one
//! child stores the child's JSON at the type path; multiple children nest
//! one level deeper keyed by slug, and children sharing a slug nest again
//! keyed by version. Parsing detects a contract leaf by the presence of a
//! string `type` field.

use crate::core::contract::Contract;
use crate::core::error::{CovenantError, Result};
use serde_json::{Map, Value};

fn set_path(tree: &mut Map<String, Value>, dotted: &str, node: Value) {
    let mut segments = dotted.split('.').peekable();
    let mut cursor = tree;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            cursor.insert(segment.to_string(), node);
            return;
        }
        let entry = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry
            .as_object_mut()
            .expect("entry was just coerced to an object");
    }
}

/// Serializes a contract's immediate children into the nested tree form.
pub fn build(contract: &Contract) -> Result<Value> {
    let mut tree = Map::new();
    for contract_type in contract.child_types() {
        let children = contract.immediate_children_of_type(contract_type);
        if children.len() != contract.type_bucket_len(contract_type) {
            return Err(CovenantError::IndexDivergence(format!(
                "type index for {contract_type} references children missing from the arena"
            )));
        }
        let node = if children.len() == 1 {
            children[0].to_json()
        } else {
            let mut by_slug: Map<String, Value> = Map::new();
            for child in children {
                let slug = child
                    .slug()
                    .map(str::to_string)
                    .unwrap_or_else(|| child.identity_key());
                match by_slug.get_mut(&slug) {
                    None => {
                        by_slug.insert(slug, child.to_json());
                    }
                    Some(existing) => {
                        // Same slug twice: nest by version.
                        if existing.get("type").is_some() {
                            let previous = existing.take();
                            let mut versions = Map::new();
                            versions.insert(version_key(&previous), previous);
                            *existing = Value::Object(versions);
                        }
                        let json = child.to_json();
                        existing
                            .as_object_mut()
                            .expect("slug entry was just coerced to a version map")
                            .insert(version_key(&json), json);
                    }
                }
            }
            Value::Object(by_slug)
        };
        set_path(&mut tree, contract_type, node);
    }
    Ok(Value::Object(tree))
}

fn version_key(raw: &Value) -> String {
    raw.get("version")
        .and_then(Value::as_str)
        .unwrap_or("unversioned")
        .to_string()
}

fn visit(node: &Value, out: &mut Vec<Value>) -> Result<()> {
    let Some(map) = node.as_object() else {
        return Err(CovenantError::InvalidContract(format!(
            "children tree nodes must be objects, got {node}"
        )));
    };
    if map.get("type").is_some_and(Value::is_string) {
        out.push(node.clone());
        return Ok(());
    }
    for entry in map.values() {
        visit(entry, out)?;
    }
    Ok(())
}

/// Flattens a nested children tree back into the raw documents it holds.
pub fn parse(tree: &Value) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    visit(tree, &mut out)?;
    Ok(out)
}
