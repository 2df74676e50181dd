//! `{{path}}` template interpolation over a raw contract document.
//!
//! Every string leaf of the document may embed one or more `{{dot.path}}`
//! placeholders. Paths resolve against a snapshot of the document itself,
//! never against a parent or sibling contract. Unresolved placeholders are
//! left verbatim. Leaves whose own path falls under a blacklisted prefix
//! (dot notation, numeric segments index into arrays) are skipped.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex"))
}

/// Resolves a dot path against a document, descending objects by key and
/// arrays by numeric index.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = root;
    for segment in path.split('.') {
        cursor = match cursor {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cursor)
}

fn is_blacklisted(path: &str, blacklist: &[String]) -> bool {
    blacklist.iter().any(|prefix| {
        path == prefix
            || (path.len() > prefix.len()
                && path.starts_with(prefix.as_str())
                && path.as_bytes()[prefix.len()] == b'.')
    })
}

fn interpolate_leaf(text: &str, snapshot: &Value) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &regex::Captures| {
            match lookup(snapshot, caps[1].trim()) {
                Some(Value::String(resolved)) => resolved.clone(),
                Some(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn walk(node: &mut Value, snapshot: &Value, blacklist: &[String], path: &str) {
    match node {
        Value::String(text) => {
            if !is_blacklisted(path, blacklist) && text.contains("{{") {
                *text = interpolate_leaf(text, snapshot);
            }
        }
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(entry, snapshot, blacklist, &child_path);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                let child_path = if path.is_empty() {
                    index.to_string()
                } else {
                    format!("{path}.{index}")
                };
                walk(item, snapshot, blacklist, &child_path);
            }
        }
        _ => {}
    }
}

/// Interpolates every string leaf of `root` in place against a snapshot of
/// the document taken before the pass.
pub fn interpolate_raw(root: &mut Value, blacklist: &[String]) {
    let snapshot = root.clone();
    walk(root, &snapshot, blacklist, "");
}
