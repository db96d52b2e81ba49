//! # Cache Error Taxonomy
//!
//! Internal errors raised by the item store. The server maps each variant
//! onto exactly one of the wire-level outcomes (`CLIENT_ERROR`,
//! `SERVER_ERROR`, or `ERROR`) — this crate knows nothing about the wire.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the item store to its caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Key was empty, longer than 250 bytes, or contained whitespace/control bytes.
    #[error("bad key")]
    BadKey,
    /// Value exceeded the configured per-item ceiling.
    #[error("object too large for cache")]
    ValueTooLarge,
    /// The allocator could not satisfy the request, with eviction disabled
    /// or exhausted.
    #[error("out of memory")]
    OutOfMemory,
    /// The deferred-delete queue could not accept another entry.
    #[error("delete queue full")]
    DeleteQueueFull,
}
