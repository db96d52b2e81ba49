//! # Connection State Machine (TCP / Unix stream)
//!
//! spec.md §4.4 describes seven states (Listening, Read, Nread, Swallow,
//! Write, Mwrite, Closing) driven by a non-blocking event loop. Built on
//! `tokio`, the event loop itself is the runtime's reactor; what this
//! module owns is everything spec.md pins to the *connection*: the
//! per-connection read buffer, the Read → Nread/Swallow → dispatch →
//! Write/Mwrite cycle, and the `reqs_per_event` yield so one busy
//! connection can't starve its siblings on the same worker.
//!
//! State correspondence, for a reader comparing this to spec.md:
//! - **Read** is the `find_line`/`stream.read_buf` loop below.
//! - **Nread** is [`read_exact_payload`] (the happy path: the value fits
//!   under the configured ceiling).
//! - **Swallow** is [`swallow_bytes`] (the value is over the ceiling, or a
//!   bad key was discovered — the bytes are still on the wire and must be
//!   drained before the connection can return to Read).
//! - **Write** is a plain `write_all` of one [`Response::Simple`] buffer.
//! - **Mwrite** is [`write_vectored_all`] over a [`GetResponse`]'s
//!   fragments; the pinned items it holds are released (via `PinnedItem`'s
//!   `Drop`) the moment the response goes out of scope.
//! - **Closing** is simply returning from this function.

use std::io::{self, IoSlice};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::dispatch::{self, DispatchOutcome, GetResponse, Response};
use crate::protocol::{self, ParseOutcome};
use crate::state::ServerState;

const SWALLOW_CHUNK: usize = 16 * 1024;
const INITIAL_READ_BUF: usize = 8 * 1024;
/// Buffers larger than this are returned to the allocator instead of kept
/// around for the next command, matching spec.md §4.4's "at each command
/// boundary the machine may shrink oversized buffers."
const MAX_IDLE_READ_BUF: usize = 256 * 1024;

/// Drives one TCP or Unix-stream client end to end: parses commands off
/// the wire, dispatches them against the shared [`ServerState`], and
/// writes responses back, until the client disconnects, sends `quit`, or
/// an unrecoverable I/O error occurs.
pub async fn run_connection<S>(mut stream: S, state: Arc<ServerState>, peer: String)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    state.on_connect();
    if let Err(err) = drive(&mut stream, &state).await {
        if err.kind() != io::ErrorKind::UnexpectedEof {
            warn!(%peer, error = %err, "connection closed with error");
        }
    }
    state.on_disconnect();
    debug!(%peer, "connection closed");
}

async fn drive<S>(stream: &mut S, state: &Arc<ServerState>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut read_buf = BytesMut::with_capacity(INITIAL_READ_BUF);
    let mut processed_since_yield = 0usize;
    let reqs_per_event = state.config.reqs_per_event.max(1);

    loop {
        let line = match find_line(&read_buf) {
            Some(len) => {
                let mut line = read_buf.split_to(len);
                trim_line_buffer(&mut line);
                line
            }
            None => {
                let n = stream.read_buf(&mut read_buf).await?;
                if n == 0 {
                    return Ok(());
                }
                continue;
            }
        };

        match protocol::parse_command(&line) {
            ParseOutcome::ProtocolError(_) => {
                let mut buf = Vec::new();
                protocol::resp_error(&mut buf);
                stream.write_all(&buf).await?;
            }
            ParseOutcome::ClientError(protocol::ClientError(msg)) => {
                let mut buf = Vec::new();
                protocol::resp_client_error(&mut buf, msg);
                stream.write_all(&buf).await?;
            }
            ParseOutcome::Command(cmd) => {
                trace!(?cmd, "dispatching command");
                match dispatch::dispatch(cmd, state) {
                    DispatchOutcome::NeedsPayload { op, key, flags, exptime, vlen } => {
                        let response = handle_nread(stream, &mut read_buf, state, op, key, flags, exptime, vlen).await?;
                        send_response(stream, response).await?;
                    }
                    DispatchOutcome::Done(Response::Quit) => return Ok(()),
                    DispatchOutcome::Done(response) => {
                        send_response(stream, response).await?;
                    }
                }
            }
        }

        if read_buf.capacity() > MAX_IDLE_READ_BUF && read_buf.is_empty() {
            read_buf = BytesMut::with_capacity(INITIAL_READ_BUF);
        }

        processed_since_yield += 1;
        if processed_since_yield >= reqs_per_event {
            processed_since_yield = 0;
            tokio::task::yield_now().await;
        }
    }
}

/// The Nread (or Swallow, on an oversized value) state: reads the `vlen +
/// 2` byte payload that follows a `set`/`add`/`replace` line, validates
/// the trailing `\r\n`, and commits the store-item decision.
async fn handle_nread<S>(
    stream: &mut S,
    read_buf: &mut BytesMut,
    state: &Arc<ServerState>,
    op: tcache_engine::StoreOp,
    key: Vec<u8>,
    flags: u32,
    exptime: i64,
    vlen: usize,
) -> io::Result<Response>
where
    S: AsyncRead + Unpin,
{
    if vlen > protocol::MAX_VALUE_LEN {
        swallow_bytes(stream, read_buf, vlen + 2).await?;
        let mut buf = Vec::new();
        protocol::resp_server_error(&mut buf, "object too large for cache");
        return Ok(Response::Simple(buf));
    }

    let payload = read_exact_payload(stream, read_buf, vlen + 2).await?;
    if &payload[vlen..] != b"\r\n" {
        let mut buf = Vec::new();
        protocol::resp_client_error(&mut buf, "bad data chunk");
        return Ok(Response::Simple(buf));
    }

    let value = payload[..vlen].to_vec();
    Ok(dispatch::finish_store(state, op, key, flags, exptime, value))
}

async fn send_response<S>(stream: &mut S, response: Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match response {
        Response::Simple(buf) => stream.write_all(&buf).await,
        Response::Get(get) => write_get_response(stream, &get).await,
        Response::Quit => Ok(()),
    }
}

/// Mwrite: transmits a `get`/`bget` reply as scattered fragments (header
/// line, value bytes, trailing `\r\n`, per hit) via a single vectored
/// write loop, handling partial writes by re-slicing whichever fragment
/// the kernel only partly accepted. `get.pins` keeps every hit's refcount
/// bumped until this function returns, then they drop together.
async fn write_get_response<S>(stream: &mut S, get: &GetResponse) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut fragments: Vec<&[u8]> = Vec::with_capacity(get.pins.len() * 3 + 1);
    for (header, pin) in get.headers.iter().zip(&get.pins) {
        fragments.push(header.as_slice());
        fragments.push(&pin.value);
        fragments.push(b"\r\n");
    }
    fragments.push(get.trailer.as_slice());
    write_vectored_all(stream, fragments).await
}

async fn write_vectored_all<S>(stream: &mut S, mut fragments: Vec<&[u8]>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut start = 0;
    while start < fragments.len() {
        let slices: Vec<IoSlice> = fragments[start..].iter().map(|f| IoSlice::new(f)).collect();
        let n = stream.write_vectored(&slices).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write_vectored wrote zero bytes"));
        }
        let mut remaining = n;
        while remaining > 0 {
            let len = fragments[start].len();
            if remaining < len {
                fragments[start] = &fragments[start][remaining..];
                remaining = 0;
            } else {
                remaining -= len;
                start += 1;
            }
        }
    }
    Ok(())
}

/// Reads `len` bytes total, first draining whatever is already buffered,
/// then reading more off the socket. Returns the bytes as an owned `Vec`
/// (the read buffer itself is reused for the next command).
async fn read_exact_payload<S>(stream: &mut S, read_buf: &mut BytesMut, len: usize) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    while read_buf.len() < len {
        let n = stream.read_buf(read_buf).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof while reading value payload"));
        }
    }
    Ok(read_buf.split_to(len).to_vec())
}

/// Discards exactly `remaining` bytes without retaining them: used when a
/// value can't be stored (too large) but the client has already started
/// sending it.
async fn swallow_bytes<S>(stream: &mut S, read_buf: &mut BytesMut, mut remaining: usize) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    if read_buf.len() >= remaining {
        let _ = read_buf.split_to(remaining);
        return Ok(());
    }
    remaining -= read_buf.len();
    read_buf.clear();

    let mut scratch = [0u8; SWALLOW_CHUNK];
    while remaining > 0 {
        let to_read = remaining.min(scratch.len());
        let n = stream.read(&mut scratch[..to_read]).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof while swallowing oversized payload"));
        }
        remaining -= n;
    }
    Ok(())
}

/// Finds a `\n`-terminated line in `buf`, returning its length including
/// the `\n` (the optional `\r` before it is stripped by the caller).
fn find_line(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

/// Strips the trailing `\n` (and an optional `\r` before it) from a line
/// split off the read buffer by [`find_line`].
fn trim_line_buffer(line: &mut BytesMut) {
    if line.last() == Some(&b'\n') {
        line.truncate(line.len() - 1);
    }
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_line_locates_newline() {
        assert_eq!(find_line(b"get k\n"), Some(6));
        assert_eq!(find_line(b"get k"), None);
    }

    #[test]
    fn trim_line_buffer_strips_crlf_and_lf() {
        let mut line = BytesMut::from(&b"get k\r\n"[..]);
        trim_line_buffer(&mut line);
        assert_eq!(&line[..], b"get k");

        let mut line = BytesMut::from(&b"get k\n"[..]);
        trim_line_buffer(&mut line);
        assert_eq!(&line[..], b"get k");
    }
}
