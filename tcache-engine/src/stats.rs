//! # Per-Thread Statistics
//!
//! Every counter a worker touches on the hot path lives thread-local, so no
//! cross-thread cache-line ping-pong happens on `get`/`set`. Aggregation
//! (for the `stats` command) happens on demand by summing every registered
//! thread's block; that's off the hot path entirely.

use std::cell::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Default)]
pub struct ThreadStats {
    pub cmd_get: AtomicU64,
    pub cmd_set: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub total_items: AtomicU64,
    pub evictions: AtomicU64,
    pub expired_unfetched: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatsSnapshot {
    pub cmd_get: u64,
    pub cmd_set: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub total_items: u64,
    pub evictions: u64,
    pub expired_unfetched: u64,
}

/// Process-wide registry of every worker thread's counter block.
#[derive(Default)]
pub struct StatsRegistry {
    threads: Mutex<Vec<Arc<ThreadStats>>>,
}

impl StatsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(StatsRegistry::default())
    }

    fn register(&self) -> Arc<ThreadStats> {
        let block = Arc::new(ThreadStats::default());
        self.threads.lock().unwrap().push(Arc::clone(&block));
        block
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut snap = StatsSnapshot::default();
        for block in self.threads.lock().unwrap().iter() {
            snap.cmd_get += block.cmd_get.load(Ordering::Relaxed);
            snap.cmd_set += block.cmd_set.load(Ordering::Relaxed);
            snap.get_hits += block.get_hits.load(Ordering::Relaxed);
            snap.get_misses += block.get_misses.load(Ordering::Relaxed);
            snap.total_items += block.total_items.load(Ordering::Relaxed);
            snap.evictions += block.evictions.load(Ordering::Relaxed);
            snap.expired_unfetched += block.expired_unfetched.load(Ordering::Relaxed);
        }
        snap
    }

    /// Returns the calling thread's counter block, registering it the
    /// first time this thread touches the registry.
    pub fn local(self: &Arc<Self>) -> Arc<ThreadStats> {
        thread_local! {
            static LOCAL: OnceCell<Arc<ThreadStats>> = const { OnceCell::new() };
        }
        LOCAL.with(|cell| Arc::clone(cell.get_or_init(|| self.register())))
    }
}

/// Lazily-initialized process-default registry, for call sites that don't
/// thread a `StatsRegistry` handle through explicitly (e.g. engine-internal
/// bookkeeping shared with the server's command dispatcher).
pub fn global() -> &'static Arc<StatsRegistry> {
    static GLOBAL: OnceLock<Arc<StatsRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(StatsRegistry::new)
}

macro_rules! bump {
    ($registry:expr, $field:ident) => {
        $registry.local().$field.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    };
}
pub(crate) use bump;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_across_threads() {
        let registry = StatsRegistry::new();
        bump!(registry, cmd_get);
        bump!(registry, cmd_get);

        let handle_registry = Arc::clone(&registry);
        let handle = std::thread::spawn(move || {
            bump!(handle_registry, cmd_get);
        });
        handle.join().unwrap();

        assert_eq!(registry.snapshot().cmd_get, 3);
    }
}
