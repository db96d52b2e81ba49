//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for issuing text-protocol cache
//! commands against a `tcache-server` instance.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `CacheClient` hides pooling and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.
//! 4. **Performance First**: Prefer direct TCP writes and buffer reuse.

use std::fmt;
use std::time::Duration;

use crate::pool::{ConnectionPool, PoolConfig};
use crate::wire::{self, SimpleReply, ValueEntry};

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// Malformed response line or framing.
    Protocol,
    /// Server returned `SERVER_ERROR`/`CLIENT_ERROR`/`ERROR`.
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    UnexpectedResponse,
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be parsed into a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::Server { message } => {
                write!(f, "server error: {}", String::from_utf8_lossy(message))
            }
            ClientError::UnexpectedResponse => write!(f, "unexpected response"),
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

/// A value fetched by `get`/`get_many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValue {
    pub flags: u32,
    pub data: Vec<u8>,
}

/// Whether a store (`set`/`add`/`replace`) succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResult {
    Stored,
    NotStored,
}

/// Whether `delete` found a key to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:11211".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:11211".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Synchronous client with connection pooling.
///
/// This is a facade over the pool and the text-protocol encoder/decoder.
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool.
pub struct CacheClient {
    pool: ConnectionPool,
}

impl CacheClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.addr = addr.into();
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(CacheClient { pool })
    }

    /// Fetches a single value by key. `Ok(None)` means a miss.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<CacheValue>> {
        let mut values = self.get_many(&[key])?;
        Ok(values.pop().map(|(_, v)| v))
    }

    /// Fetches several keys in one round trip; misses are simply absent
    /// from the returned list (the wire protocol never echoes a miss).
    pub fn get_many(&self, keys: &[&[u8]]) -> ClientResult<Vec<(Vec<u8>, CacheValue)>> {
        let mut line = Vec::new();
        let mut parts: Vec<&[u8]> = vec![b"get"];
        parts.extend_from_slice(keys);
        wire::write_line(&mut line, &parts);

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let result = wire::read_get_reply(conn.reader(), &mut line_buf);
        if result.is_err() {
            conn.invalidate();
        }
        let entries = result?;
        Ok(entries
            .into_iter()
            .map(|ValueEntry { key, flags, data }| (key, CacheValue { flags, data }))
            .collect())
    }

    /// Unconditionally stores `key`. `exptime` follows the wire rules: `0`
    /// means never, values `<= 30 days` are relative, larger are absolute.
    pub fn set(&self, key: &[u8], flags: u32, exptime: i64, value: &[u8]) -> ClientResult<()> {
        match self.store(b"set", key, flags, exptime, value)? {
            StoreResult::Stored => Ok(()),
            StoreResult::NotStored => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Stores `key` only if it does not already exist.
    pub fn add(&self, key: &[u8], flags: u32, exptime: i64, value: &[u8]) -> ClientResult<StoreResult> {
        self.store(b"add", key, flags, exptime, value)
    }

    /// Stores `key` only if it already exists.
    pub fn replace(&self, key: &[u8], flags: u32, exptime: i64, value: &[u8]) -> ClientResult<StoreResult> {
        self.store(b"replace", key, flags, exptime, value)
    }

    fn store(&self, verb: &[u8], key: &[u8], flags: u32, exptime: i64, value: &[u8]) -> ClientResult<StoreResult> {
        let mut line = Vec::new();
        let flags_s = flags.to_string();
        let exptime_s = exptime.to_string();
        let vlen_s = value.len().to_string();
        wire::write_line(&mut line, &[verb, key, flags_s.as_bytes(), exptime_s.as_bytes(), vlen_s.as_bytes()]);
        let mut payload = Vec::with_capacity(value.len() + 2);
        wire::write_payload(&mut payload, value);

        let mut conn = self.pool.acquire()?;
        conn.send(&line, Some(&payload))?;
        let mut line_buf = Vec::new();
        let reply = wire::read_simple_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        match reply? {
            SimpleReply::Stored => Ok(StoreResult::Stored),
            SimpleReply::NotStored => Ok(StoreResult::NotStored),
            SimpleReply::ClientError(message) | SimpleReply::ServerError(message) => {
                Err(ClientError::Server { message })
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Increments the stored decimal value by `delta`. `Ok(None)` on a miss.
    pub fn incr(&self, key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        self.arith(b"incr", key, delta)
    }

    /// Decrements the stored decimal value by `delta`, saturating at zero.
    pub fn decr(&self, key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        self.arith(b"decr", key, delta)
    }

    fn arith(&self, verb: &[u8], key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        let mut line = Vec::new();
        let delta_s = delta.to_string();
        wire::write_line(&mut line, &[verb, key, delta_s.as_bytes()]);

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let reply = wire::read_simple_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        match reply? {
            SimpleReply::Number(v) => Ok(Some(v)),
            SimpleReply::NotFound => Ok(None),
            SimpleReply::ClientError(message) | SimpleReply::ServerError(message) => {
                Err(ClientError::Server { message })
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Deletes a key. `exptime > 0` delete-locks the key instead of
    /// removing it immediately (see the server's deferred-delete queue).
    pub fn delete(&self, key: &[u8], exptime: Option<i64>) -> ClientResult<DeleteResult> {
        let mut line = Vec::new();
        match exptime {
            Some(t) if t > 0 => {
                let t_s = t.to_string();
                wire::write_line(&mut line, &[b"delete", key, t_s.as_bytes()]);
            }
            _ => wire::write_line(&mut line, &[b"delete", key]),
        }

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let reply = wire::read_simple_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        match reply? {
            SimpleReply::Deleted => Ok(DeleteResult::Deleted),
            SimpleReply::NotFound => Ok(DeleteResult::NotFound),
            SimpleReply::ClientError(message) | SimpleReply::ServerError(message) => {
                Err(ClientError::Server { message })
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Sets the flush horizon. `None` flushes every item live right now.
    pub fn flush_all(&self, exptime: Option<i64>) -> ClientResult<()> {
        let mut line = Vec::new();
        match exptime {
            Some(t) => {
                let t_s = t.to_string();
                wire::write_line(&mut line, &[b"flush_all", t_s.as_bytes()]);
            }
            None => wire::write_line(&mut line, &[b"flush_all"]),
        }

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let reply = wire::read_simple_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        match reply? {
            SimpleReply::Ok => Ok(()),
            SimpleReply::ClientError(message) | SimpleReply::ServerError(message) => {
                Err(ClientError::Server { message })
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Returns the server's version string.
    pub fn version(&self) -> ClientResult<Vec<u8>> {
        let mut line = Vec::new();
        wire::write_line(&mut line, &[b"version"]);

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let reply = wire::read_version_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        reply
    }

    /// Fetches the general `stats` report as `(name, value)` pairs.
    pub fn stats(&self) -> ClientResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut line = Vec::new();
        wire::write_line(&mut line, &[b"stats"]);

        let mut conn = self.pool.acquire()?;
        conn.send(&line, None)?;
        let mut line_buf = Vec::new();
        let reply = wire::read_stats_reply(conn.reader(), &mut line_buf);
        if reply.is_err() {
            conn.invalidate();
        }
        reply
    }
}
