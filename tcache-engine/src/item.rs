//! # Item Representation
//!
//! An item's on-disk layout in this engine: a dense arena slot, addressed by
//! index rather than pointer, carrying key/value buffers plus the metadata
//! the store needs to answer `get`/`incr`/`delete` without touching the
//! allocator (which lives outside this crate's scope).

use std::sync::Arc;

use tcache_common::clock::Exptime;

/// Why an item left the LRU chain, for stats bookkeeping (`evictions` vs
/// `expired_unfetched`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkReason {
    /// `delete` or a `replace`/`set` superseding this item.
    Explicit,
    /// Popped from the LRU tail to make room for a new allocation.
    Evicted,
    /// Found expired on access, or swept by `flush_all`'s horizon.
    Expired,
}

/// A single arena-resident item.
///
/// `refcount` is the number of outstanding borrows *plus one while linked*
/// (the index itself holds a reference). It never needs atomics: every
/// field access happens while the owning shard's lock is held.
#[derive(Debug)]
pub struct Item {
    pub key: Arc<[u8]>,
    pub value: Arc<[u8]>,
    pub flags: u32,
    pub exptime: Exptime,
    /// `current_time` at the moment this item was stored; compared against
    /// `oldest_live` for the flush horizon.
    pub created: u32,
    pub refcount: usize,
    /// Set while the item sits in the deferred-delete queue.
    pub delete_locked: bool,
    /// Cleared the moment the item leaves the index and LRU chain; a slot
    /// can stay occupied with `linked == false` while an outstanding borrow
    /// keeps `refcount > 0`.
    pub linked: bool,
    pub size: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Item {
    pub fn new(key: Arc<[u8]>, value: Arc<[u8]>, flags: u32, exptime: Exptime, created: u32) -> Self {
        let size = key.len() + value.len();
        Item {
            key,
            value,
            flags,
            exptime,
            created,
            refcount: 1,
            delete_locked: false,
            linked: true,
            size,
            prev: None,
            next: None,
        }
    }

    pub fn is_expired(&self, current_time: u32, oldest_live: Option<u32>) -> bool {
        if self.exptime.is_expired(current_time) {
            return true;
        }
        matches!(oldest_live, Some(horizon) if horizon <= current_time && self.created <= horizon)
    }
}
