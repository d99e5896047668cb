//! A keyed, shared registry.
//!
//! `spec.md` §9 singles out "hash table of open files implemented as array of
//! linked lists" as a pattern that needs re-architecture: "model as a mapping
//! keyed by sector." This module is that mapping. It backs both the
//! open-file registry (keyed by file-header sector) and the subdirectory
//! lock registry (keyed by directory-header sector); both need a shared,
//! reference-counted entry that is created on first use and torn down when
//! nobody references it anymore, and both carry bookkeeping specific to
//! their own contract (reader counts and a `to_delete` flag for one,
//! a bare mutual-exclusion lock for the other) that this module intentionally
//! does not know about.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// A handle into a `Registry`: a reference-counted, shared entry.
pub type RegistryHandle<V> = Arc<V>;

/// Thread-safe `key -> shared value` table. Entries are created lazily by
/// `get_or_insert_with` and are only ever removed explicitly via `remove`;
/// callers that need entries to disappear once unreferenced should check
/// `Arc::strong_count` themselves (as `OpenFileRegistry` and
/// `SubdirectoryLockRegistry` do) before calling `remove`.
pub struct Registry<K, V> {
    table: Mutex<HashMap<K, RegistryHandle<V>>>,
}

impl<K: Eq + Hash + Clone, V> Registry<K, V> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing entry for `key`, or creates one with `make` and
    /// inserts it first.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> RegistryHandle<V> {
        let mut table = self.table.lock().unwrap();
        table
            .entry(key)
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<RegistryHandle<V>> {
        self.table.lock().unwrap().get(key).cloned()
    }

    /// Removes the entry for `key` unconditionally. Returns the removed
    /// handle, if any existed.
    pub fn remove(&self, key: &K) -> Option<RegistryHandle<V>> {
        self.table.lock().unwrap().remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.table.lock().unwrap().contains_key(key)
    }
}

impl<K: Eq + Hash + Clone, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_once_and_shares() {
        let reg: Registry<i32, Mutex<u32>> = Registry::new();
        let a = reg.get_or_insert_with(1, || Mutex::new(0));
        let b = reg.get_or_insert_with(1, || Mutex::new(99));
        *a.lock().unwrap() += 1;
        assert_eq!(*b.lock().unwrap(), 1);
        assert_eq!(Arc::strong_count(&a), 3); // a, b, and the table's own handle
    }

    #[test]
    fn remove_drops_table_reference() {
        let reg: Registry<i32, ()> = Registry::new();
        let h = reg.get_or_insert_with(1, || ());
        assert_eq!(Arc::strong_count(&h), 2);
        reg.remove(&1);
        assert_eq!(Arc::strong_count(&h), 1);
        assert!(!reg.contains(&1));
    }
}
