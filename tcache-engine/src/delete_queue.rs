//! # Deferred-Delete Queue
//!
//! Backs `delete K T` for `T > 0`: the item is hidden from readers
//! immediately (via its delete-locked flag) but its storage isn't reclaimed
//! until the 5-second sweep finds its window has passed. The queue holds
//! its own pin on each entry so a concurrent `set K` — which overwrites the
//! delete-locked item outright — can't race the sweeper into a double
//! unlink.

use std::collections::VecDeque;

/// One entry in the queue. `shard` and `slot` address the item directly;
/// the sweeper re-checks `linked` under the shard lock before acting, since
/// a `set K` may have already unlinked and replaced this slot's occupant.
#[derive(Debug, Clone, Copy)]
pub struct DeferredEntry {
    pub shard: usize,
    pub slot: usize,
    pub delete_time: u32,
}

#[derive(Debug, Default)]
pub struct DeleteQueue {
    entries: VecDeque<DeferredEntry>,
}

impl DeleteQueue {
    pub fn new() -> Self {
        DeleteQueue::default()
    }

    pub fn push(&mut self, entry: DeferredEntry) {
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains every entry whose delete window has passed at `current_time`,
    /// leaving entries that are not yet due in the queue.
    pub fn drain_due(&mut self, current_time: u32) -> Vec<DeferredEntry> {
        let mut due = Vec::new();
        self.entries.retain(|entry| {
            if entry.delete_time <= current_time {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_only_due_entries() {
        let mut queue = DeleteQueue::new();
        queue.push(DeferredEntry { shard: 0, slot: 1, delete_time: 10 });
        queue.push(DeferredEntry { shard: 0, slot: 2, delete_time: 20 });

        let due = queue.drain_due(15);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].slot, 1);
        assert_eq!(queue.len(), 1);
    }
}
