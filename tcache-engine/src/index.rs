//! # Incrementally Rehashing Hash Index
//!
//! A power-of-two bucket array with chaining, migrated one bucket at a time
//! instead of all at once. `hashbrown`'s `HashMap` resizes atomically and
//! gives no hook to spread that cost out, so this is hand-rolled: every
//! lookup, insert, or remove first migrates exactly one bucket from the old
//! table (if a rehash is in flight) before doing its own work. New entries
//! always land in the new table; readers consult both until the old table
//! drains to empty.

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use ahash::RandomState;

const INITIAL_BUCKETS: usize = 16;
/// Rehash triggers once the load factor would exceed 3/2.
const LOAD_FACTOR_NUM: usize = 3;
const LOAD_FACTOR_DEN: usize = 2;

type Bucket = Vec<(Arc<[u8]>, usize)>;

pub struct RehashingIndex {
    hash_state: RandomState,
    buckets: Vec<Bucket>,
    old: Option<Vec<Bucket>>,
    migrate_cursor: usize,
    len: usize,
}

impl RehashingIndex {
    pub fn new(hash_state: RandomState) -> Self {
        RehashingIndex {
            hash_state,
            buckets: (0..INITIAL_BUCKETS).map(|_| Vec::new()).collect(),
            old: None,
            migrate_cursor: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        hasher.finish()
    }

    fn bucket_index(hash: u64, table_len: usize) -> usize {
        (hash as usize) & (table_len - 1)
    }

    /// Migrates the bucket at `migrate_cursor` from the old table into the
    /// new one, if a rehash is in progress. Call this before every
    /// operation so the migration cost is spread across all callers.
    fn migrate_step(&mut self) {
        let Some(old) = self.old.as_mut() else {
            return;
        };
        if self.migrate_cursor >= old.len() {
            self.old = None;
            return;
        }
        let entries = std::mem::take(&mut old[self.migrate_cursor]);
        self.migrate_cursor += 1;
        for (key, slot) in entries {
            let hash = self.hash(&key);
            let idx = Self::bucket_index(hash, self.buckets.len());
            self.buckets[idx].push((key, slot));
        }
        if self.migrate_cursor >= old.len() {
            self.old = None;
        }
    }

    fn start_rehash_if_needed(&mut self) {
        if self.old.is_some() {
            return;
        }
        if self.len * LOAD_FACTOR_DEN <= self.buckets.len() * LOAD_FACTOR_NUM {
            return;
        }
        let new_len = self.buckets.len() * 2;
        let new_buckets = (0..new_len).map(|_| Vec::new()).collect();
        self.old = Some(std::mem::replace(&mut self.buckets, new_buckets));
        self.migrate_cursor = 0;
    }

    pub fn get(&mut self, key: &[u8]) -> Option<usize> {
        self.migrate_step();
        let hash = self.hash(key);

        let idx = Self::bucket_index(hash, self.buckets.len());
        if let Some(&(_, slot)) = self.buckets[idx].iter().find(|(k, _)| k.as_ref() == key) {
            return Some(slot);
        }

        if let Some(old) = &self.old {
            let old_idx = Self::bucket_index(hash, old.len());
            if let Some(&(_, slot)) = old[old_idx].iter().find(|(k, _)| k.as_ref() == key) {
                return Some(slot);
            }
        }
        None
    }

    /// Inserts a new key; callers must ensure the key is absent (use
    /// `remove` first to replace).
    pub fn insert(&mut self, key: Arc<[u8]>, slot: usize) {
        self.migrate_step();
        let hash = self.hash(&key);
        let idx = Self::bucket_index(hash, self.buckets.len());
        self.buckets[idx].push((key, slot));
        self.len += 1;
        self.start_rehash_if_needed();
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<usize> {
        self.migrate_step();
        let hash = self.hash(key);

        let idx = Self::bucket_index(hash, self.buckets.len());
        if let Some(pos) = self.buckets[idx].iter().position(|(k, _)| k.as_ref() == key) {
            let (_, slot) = self.buckets[idx].swap_remove(pos);
            self.len -= 1;
            return Some(slot);
        }

        if let Some(old) = self.old.as_mut() {
            let old_idx = Self::bucket_index(hash, old.len());
            if let Some(pos) = old[old_idx].iter().position(|(k, _)| k.as_ref() == key) {
                let (_, slot) = old[old_idx].swap_remove(pos);
                self.len -= 1;
                return Some(slot);
            }
        }
        None
    }

    /// Every live (key, slot) pair across both tables. Used by
    /// `flush_regex` and tests; O(n), not for the hot path.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<[u8]>, usize)> {
        let current = self.buckets.iter().flatten().map(|(k, s)| (k, *s));
        let old = self.old.iter().flatten().flatten().map(|(k, s)| (k, *s));
        current.chain(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Arc<[u8]> {
        Arc::from(s.as_bytes())
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut idx = RehashingIndex::new(RandomState::new());
        idx.insert(key("a"), 1);
        idx.insert(key("b"), 2);
        assert_eq!(idx.get(b"a"), Some(1));
        assert_eq!(idx.get(b"b"), Some(2));
        assert_eq!(idx.get(b"c"), None);
    }

    #[test]
    fn remove_drops_entry() {
        let mut idx = RehashingIndex::new(RandomState::new());
        idx.insert(key("a"), 1);
        assert_eq!(idx.remove(b"a"), Some(1));
        assert_eq!(idx.get(b"a"), None);
    }

    #[test]
    fn growth_triggers_incremental_migration() {
        let mut idx = RehashingIndex::new(RandomState::new());
        for i in 0..64 {
            idx.insert(key(&format!("k{i}")), i);
        }
        // Every key remains reachable through however many migration steps
        // have interleaved with the inserts above.
        for i in 0..64 {
            assert_eq!(idx.get(format!("k{i}").as_bytes()), Some(i));
        }
    }

    #[test]
    fn migration_completes_eventually() {
        let mut idx = RehashingIndex::new(RandomState::new());
        for i in 0..64 {
            idx.insert(key(&format!("k{i}")), i);
        }
        for _ in 0..200 {
            idx.migrate_step();
        }
        assert!(idx.old.is_none());
    }
}
