//! # Cache Text-Protocol Sync Client
//!
//! Provide a lightweight, synchronous client for the line-oriented cache
//! protocol with connection pooling to minimize TCP handshake overhead.
//! Used by `tcache-server`'s own integration tests as well as external
//! callers.

mod client;
mod pool;
mod wire;

pub use client::{CacheClient, CacheValue, ClientConfig, ClientError, ClientResult, DeleteResult, StoreResult};
