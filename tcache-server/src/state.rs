//! # Shared Server State
//!
//! Everything a connection handler needs that isn't purely local: the item
//! store, the process configuration, and the handful of process-wide
//! counters `stats` reports (`pid`, uptime, connection totals, thread
//! count). `Cache` already shards its own locking internally (see
//! `tcache-engine`), so nothing here needs its own mutex beyond the atomics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use tcache_common::clock::Clock;
use tcache_engine::Cache;

use crate::config::ServerConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process-wide state shared by every connection and listener.
pub struct ServerState {
    pub cache: Arc<Cache>,
    pub config: ServerConfig,
    pub clock: Arc<Clock>,
    /// Bounds simultaneous connections to `config.max_conns`; the listener
    /// holds a permit for the lifetime of each accepted connection and
    /// disarms itself (stops calling `accept`) while the pool is empty,
    /// mirroring the reference implementation's `EMFILE` back-pressure.
    pub accept_permits: Semaphore,
    pub curr_connections: AtomicU64,
    pub total_connections: AtomicU64,
    /// Adjustable at runtime via the `verbosity N` command (spec.md §4.5).
    /// `tracing`'s own env-filter governs what actually gets emitted; this
    /// counter is consulted by call sites that want extra-chatty logging
    /// beyond `debug!`/`trace!` (e.g. per-command tracing) without paying
    /// for a `tracing_subscriber` filter reload on every request.
    pub verbosity: AtomicU32,
}

impl ServerState {
    pub fn new(config: ServerConfig, cache: Arc<Cache>, clock: Arc<Clock>) -> Arc<Self> {
        let max_conns = config.max_conns;
        let verbosity = config.verbosity;
        Arc::new(ServerState {
            cache,
            config,
            clock,
            accept_permits: Semaphore::new(max_conns),
            curr_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            verbosity: AtomicU32::new(verbosity),
        })
    }

    pub fn on_connect(&self) {
        self.curr_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.curr_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn verbosity(&self) -> u32 {
        self.verbosity.load(Ordering::Relaxed)
    }

    pub fn set_verbosity(&self, level: u32) {
        self.verbosity.store(level, Ordering::Relaxed);
    }
}
