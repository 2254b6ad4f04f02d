//! Local result store seam.
//!
//! The store that actually holds and looks up entries by key is an
//! external collaborator; the exchange protocol only delivers records to
//! it. [`ResultStore`] is the seam, and [`MemoryStore`] is a reference
//! implementation of the canonical acceptance rule: a record replaces the
//! stored entry for its key when it is derived more deeply, or equally
//! deeply with a more informative bound. The rule makes duplicate and
//! self delivery idempotent.

use quarry_core::{Fingerprint, ResultRecord};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Seam to the worker's local result store
///
/// Implementations own their acceptance rule and their concurrency
/// discipline; the exchange protocol only guarantees delivery.
pub trait ResultStore: Send + Sync {
    /// Offer a delivered record; the store decides whether it wins
    fn merge(&self, record: &ResultRecord);
}

/// In-memory reference store with the depth-then-bound acceptance rule
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Fingerprint, ResultRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, ResultRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the stored entry for a key
    pub fn lookup(&self, key: Fingerprint) -> Option<ResultRecord> {
        self.lock().get(&key).copied()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn accepts(existing: &ResultRecord, incoming: &ResultRecord) -> bool {
        incoming.depth > existing.depth
            || (incoming.depth == existing.depth && incoming.bound.outranks(existing.bound))
    }
}

impl ResultStore for MemoryStore {
    fn merge(&self, record: &ResultRecord) {
        let mut entries = self.lock();
        match entries.get(&record.key) {
            Some(existing) if !Self::accepts(existing, record) => {}
            _ => {
                entries.insert(record.key, *record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{Answer, Bound};

    fn record(key: u64, depth: i32, bound: Bound) -> ResultRecord {
        ResultRecord::new(
            Fingerprint::new(key),
            depth,
            10,
            bound,
            Answer::new(key),
            0,
        )
    }

    #[test]
    fn test_merge_new_key() {
        let store = MemoryStore::new();
        store.merge(&record(1, 5, Bound::Exact));
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(Fingerprint::new(1)).unwrap().depth, 5);
    }

    #[test]
    fn test_deeper_record_wins() {
        let store = MemoryStore::new();
        store.merge(&record(1, 5, Bound::Exact));
        store.merge(&record(1, 8, Bound::Lower));
        assert_eq!(store.lookup(Fingerprint::new(1)).unwrap().depth, 8);
    }

    #[test]
    fn test_shallower_record_loses() {
        let store = MemoryStore::new();
        store.merge(&record(1, 8, Bound::Lower));
        store.merge(&record(1, 5, Bound::Exact));
        assert_eq!(store.lookup(Fingerprint::new(1)).unwrap().depth, 8);
    }

    #[test]
    fn test_equal_depth_exact_beats_bound() {
        let store = MemoryStore::new();
        store.merge(&record(1, 6, Bound::Upper));
        store.merge(&record(1, 6, Bound::Exact));
        assert_eq!(
            store.lookup(Fingerprint::new(1)).unwrap().bound,
            Bound::Exact
        );

        // And not the other way around.
        store.merge(&record(1, 6, Bound::Lower));
        assert_eq!(
            store.lookup(Fingerprint::new(1)).unwrap().bound,
            Bound::Exact
        );
    }

    #[test]
    fn test_duplicate_delivery_idempotent() {
        let store = MemoryStore::new();
        let rec = record(1, 7, Bound::Exact);
        store.merge(&rec);
        store.merge(&rec);
        store.merge(&rec);
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(Fingerprint::new(1)), Some(rec));
    }

    #[test]
    fn test_distinct_keys_coexist() {
        let store = MemoryStore::new();
        store.merge(&record(1, 3, Bound::Exact));
        store.merge(&record(2, 9, Bound::Lower));
        assert_eq!(store.len(), 2);
    }
}
