//! # Text Protocol Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server responses for the
//! line-oriented cache protocol without external dependencies, keeping
//! allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Values are treated as raw bytes, never re-encoded as text.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::{BufRead, Read};

use crate::client::{ClientError, ClientResult};

/// One `VALUE` block returned by `get`/`bget`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    pub key: Vec<u8>,
    pub flags: u32,
    pub data: Vec<u8>,
}

/// Outcome of a command that replies with one of the fixed protocol words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleReply {
    Stored,
    NotStored,
    Deleted,
    NotFound,
    Ok,
    Number(u64),
    ClientError(Vec<u8>),
    ServerError(Vec<u8>),
    Error,
}

/// Writes a command line (without the payload) terminated by `\r\n`.
pub fn write_line(out: &mut Vec<u8>, parts: &[&[u8]]) {
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(part);
    }
    out.extend_from_slice(b"\r\n");
}

/// Writes a stored-value payload (`value` followed by the trailing `\r\n`).
pub fn write_payload(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// Reads one line and classifies it as one of the fixed protocol replies,
/// falling back to parsing it as a bare decimal (the `incr`/`decr` success
/// shape) when it matches none of the keyword replies.
pub fn read_simple_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<SimpleReply> {
    read_line(reader, line_buf)?;
    Ok(classify_simple_line(line_buf))
}

fn classify_simple_line(line: &[u8]) -> SimpleReply {
    if line == b"STORED" {
        return SimpleReply::Stored;
    }
    if line == b"NOT_STORED" {
        return SimpleReply::NotStored;
    }
    if line == b"DELETED" {
        return SimpleReply::Deleted;
    }
    if line == b"NOT_FOUND" {
        return SimpleReply::NotFound;
    }
    if line == b"OK" {
        return SimpleReply::Ok;
    }
    if line == b"ERROR" {
        return SimpleReply::Error;
    }
    if let Some(msg) = line.strip_prefix(b"CLIENT_ERROR ") {
        return SimpleReply::ClientError(msg.to_vec());
    }
    if let Some(msg) = line.strip_prefix(b"SERVER_ERROR ") {
        return SimpleReply::ServerError(msg.to_vec());
    }
    if !line.is_empty() && line.iter().all(|b| b.is_ascii_digit()) {
        if let Ok(text) = std::str::from_utf8(line) {
            if let Ok(value) = text.parse::<u64>() {
                return SimpleReply::Number(value);
            }
        }
    }
    SimpleReply::Error
}

/// Reads a `VERSION <string>` reply.
pub fn read_version_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Vec<u8>> {
    read_line(reader, line_buf)?;
    match line_buf.strip_prefix(b"VERSION ") {
        Some(v) => Ok(v.to_vec()),
        None => Err(ClientError::Protocol),
    }
}

/// Reads a multi-key `get`/`bget` reply: zero or more `VALUE` blocks
/// terminated by `END`. A `CLIENT_ERROR`/`SERVER_ERROR` line in place of the
/// first `VALUE`/`END` is surfaced as a server error.
pub fn read_get_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Vec<ValueEntry>> {
    let mut values = Vec::new();
    loop {
        read_line(reader, line_buf)?;
        if line_buf == b"END" {
            return Ok(values);
        }
        if let Some(msg) = line_buf.strip_prefix(b"SERVER_ERROR ") {
            return Err(ClientError::Server { message: msg.to_vec() });
        }
        if let Some(msg) = line_buf.strip_prefix(b"CLIENT_ERROR ") {
            return Err(ClientError::Server { message: msg.to_vec() });
        }
        let Some(rest) = line_buf.strip_prefix(b"VALUE ") else {
            return Err(ClientError::Protocol);
        };
        let mut fields = rest.split(|&b| b == b' ');
        let key = fields.next().ok_or(ClientError::Protocol)?.to_vec();
        let flags: u32 = parse_ascii_u64(fields.next().ok_or(ClientError::Protocol)?)? as u32;
        let len = parse_ascii_u64(fields.next().ok_or(ClientError::Protocol)?)? as usize;

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(ClientError::Protocol);
        }
        values.push(ValueEntry { key, flags, data });
    }
}

/// Reads a `stats` reply: zero or more `STAT name value` lines terminated by `END`.
pub fn read_stats_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut stats = Vec::new();
    loop {
        read_line(reader, line_buf)?;
        if line_buf == b"END" {
            return Ok(stats);
        }
        let Some(rest) = line_buf.strip_prefix(b"STAT ") else {
            return Err(ClientError::Protocol);
        };
        let mut parts = rest.splitn(2, |&b| b == b' ');
        let name = parts.next().ok_or(ClientError::Protocol)?.to_vec();
        let value = parts.next().unwrap_or(&[]).to_vec();
        stats.push((name, value));
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(())
}

fn parse_ascii_u64(token: &[u8]) -> ClientResult<u64> {
    if token.is_empty() {
        return Err(ClientError::Protocol);
    }
    let mut value: u64 = 0;
    for &b in token {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as u64);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn writes_set_command_line() {
        let mut buf = Vec::new();
        write_line(&mut buf, &[b"set", b"foo", b"0", b"0", b"3"]);
        assert_eq!(&buf, b"set foo 0 0 3\r\n");
    }

    #[test]
    fn classifies_stored_reply() {
        let mut reader = Cursor::new(b"STORED\r\n".to_vec());
        let mut line = Vec::new();
        assert_eq!(read_simple_reply(&mut reader, &mut line).unwrap(), SimpleReply::Stored);
    }

    #[test]
    fn classifies_bare_number_as_arith_result() {
        let mut reader = Cursor::new(b"42\r\n".to_vec());
        let mut line = Vec::new();
        assert_eq!(read_simple_reply(&mut reader, &mut line).unwrap(), SimpleReply::Number(42));
    }

    #[test]
    fn reads_multi_key_get_reply() {
        let mut reader = Cursor::new(b"VALUE a 0 1\r\nx\r\nVALUE b 7 2\r\nhi\r\nEND\r\n".to_vec());
        let mut line = Vec::new();
        let values = read_get_reply(&mut reader, &mut line).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], ValueEntry { key: b"a".to_vec(), flags: 0, data: b"x".to_vec() });
        assert_eq!(values[1], ValueEntry { key: b"b".to_vec(), flags: 7, data: b"hi".to_vec() });
    }

    #[test]
    fn reads_empty_get_reply_as_end_only() {
        let mut reader = Cursor::new(b"END\r\n".to_vec());
        let mut line = Vec::new();
        assert_eq!(read_get_reply(&mut reader, &mut line).unwrap(), Vec::new());
    }

    #[test]
    fn reads_stats_reply() {
        let mut reader = Cursor::new(b"STAT pid 123\r\nSTAT version 1.0\r\nEND\r\n".to_vec());
        let mut line = Vec::new();
        let stats = read_stats_reply(&mut reader, &mut line).unwrap();
        assert_eq!(stats, vec![(b"pid".to_vec(), b"123".to_vec()), (b"version".to_vec(), b"1.0".to_vec())]);
    }
}
