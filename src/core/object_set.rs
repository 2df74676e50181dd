//! Insertion-ordered, externally-keyed deduplicating collection.
//!
//! Keys are supplied by the caller (in practice a content hash), so the set
//! never inspects its members. `add` is idempotent per key: the first insert
//! wins and later inserts under the same key are dropped. Iteration follows
//! insertion order.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct ObjectSet<T> {
    members: FxHashMap<String, T>,
    order: Vec<String>,
}

impl<T> Default for ObjectSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectSet<T> {
    pub fn new() -> Self {
        Self {
            members: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Inserts `value` under `key`. A key that is already present keeps its
    /// original value and position.
    pub fn add(&mut self, key: &str, value: T) {
        if self.members.contains_key(key) {
            return;
        }
        self.members.insert(key.to_string(), value);
        self.order.push(key.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.members.get(key)
    }

    /// Members in insertion order.
    pub fn get_all(&self) -> Vec<&T> {
        self.order
            .iter()
            .filter_map(|key| self.members.get(key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|key| self.members.get(key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_all_preserve_insertion_order() {
        let mut set = ObjectSet::new();
        set.add("c", 3);
        set.add("a", 1);
        set.add("b", 2);
        assert_eq!(set.get_all(), vec![&3, &1, &2]);
    }

    #[test]
    fn test_add_is_idempotent_per_key() {
        let mut set = ObjectSet::new();
        set.add("a", 1);
        set.add("a", 99);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a"), Some(&1));
    }

    #[test]
    fn test_has_and_get() {
        let mut set = ObjectSet::new();
        set.add("x", "value");
        assert!(set.has("x"));
        assert!(!set.has("y"));
        assert_eq!(set.get("x"), Some(&"value"));
        assert_eq!(set.get("y"), None);
    }

    #[test]
    fn test_empty_set() {
        let set: ObjectSet<i32> = ObjectSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(set.get_all().is_empty());
    }
}
