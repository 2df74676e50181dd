//! Semantic-version collaborator wrappers.
//!
//! Range satisfaction and ordering are delegated to the `semver` crate; this
//! module only adds the lenient coercion contract documents rely on: a
//! leading `v` is stripped and partial versions (`"1"`, `"1.2"`) are padded
//! with zeroes before parsing.
//!
//! A constraint that is itself a valid version means exact equality, not a
//! caret range; anything else that parses as a `VersionReq` is treated as a
//! range.

use semver::{Version, VersionReq};
use std::cmp::Ordering;

/// Coerces a loose version string into a strict semver version.
pub fn coerce(version: &str) -> Option<Version> {
    let core = version.trim().trim_start_matches('v');
    if let Ok(parsed) = Version::parse(core) {
        return Some(parsed);
    }
    // Pad missing minor/patch on the numeric core, keeping any
    // pre-release/build suffix attached.
    let split = core
        .find(['-', '+'])
        .map_or((core, ""), |at| core.split_at(at));
    let (numeric, suffix) = split;
    let mut padded = numeric.to_string();
    for _ in numeric.matches('.').count()..2 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}

/// True when `version` coerces to a valid semantic version.
pub fn valid(version: &str) -> bool {
    coerce(version).is_some()
}

/// True when `range` parses as a version range and is not itself a plain
/// version (plain versions mean exact equality).
pub fn valid_range(range: &str) -> bool {
    !valid(range) && VersionReq::parse(range.trim()).is_ok()
}

/// Range (or exact-version) satisfaction.
pub fn satisfies(version: &str, range: &str) -> bool {
    let Some(candidate) = coerce(version) else {
        return false;
    };
    if let Some(exact) = coerce(range) {
        return candidate == exact;
    }
    match VersionReq::parse(range.trim()) {
        Ok(req) => req.matches(&candidate),
        Err(_) => false,
    }
}

/// Semantic ordering with a lexicographic fallback for strings that are not
/// versions at all.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (coerce(a), coerce(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}
