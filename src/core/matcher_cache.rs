//! Per-type cache of matcher search results.
//!
//! `find_children` is called repeatedly with the same matchers during
//! blueprint resolution; results are keyed by the matcher's content hash
//! inside its type's bucket. Structural mutation of a type's membership
//! (`add_child`/`remove_child`) drops that type's bucket wholesale and
//! leaves every other type's entries untouched.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct MatcherCache {
    buckets: FxHashMap<String, FxHashMap<String, Vec<String>>>,
}

impl MatcherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached list of matching child hashes for a matcher, if present.
    pub fn get(&self, contract_type: &str, matcher_hash: &str) -> Option<&Vec<String>> {
        self.buckets.get(contract_type)?.get(matcher_hash)
    }

    pub fn has(&self, contract_type: &str, matcher_hash: &str) -> bool {
        self.get(contract_type, matcher_hash).is_some()
    }

    /// Records a search result under the matcher's type bucket.
    pub fn add(&mut self, contract_type: &str, matcher_hash: &str, result: Vec<String>) {
        self.buckets
            .entry(contract_type.to_string())
            .or_default()
            .insert(matcher_hash.to_string(), result);
    }

    /// Drops every cached result for one type.
    pub fn reset_type(&mut self, contract_type: &str) {
        self.buckets.remove(contract_type);
    }

    /// Drops the whole cache.
    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    #[cfg(test)]
    pub fn cached_types(&self) -> Vec<&String> {
        self.buckets.keys().collect()
    }
}
