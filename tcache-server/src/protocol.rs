//! # Command Parser & Response Vocabulary
//!
//! Turns one command line (terminal `\r\n` already stripped) into a
//! [`Command`], and formats every wire-level reply. Dispatch is purely by
//! first token and exact token count — an unrecognized shape is `ERROR`,
//! never a best-effort guess.

use tcache_engine::StoreOp;

pub const MAX_VALUE_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { keys: Vec<Vec<u8>> },
    MetaGet { key: Vec<u8> },
    Store { op: StoreOp, key: Vec<u8>, flags: u32, exptime: i64, vlen: usize },
    Arith { key: Vec<u8>, delta: u64, incr: bool },
    Delete { key: Vec<u8>, exptime: i64 },
    Stats { args: Vec<Vec<u8>> },
    FlushAll { exptime: Option<i64> },
    FlushRegex { pattern: Vec<u8> },
    Version,
    Quit,
    Verbosity { level: u32 },
}

/// A malformed argument within an otherwise recognized command shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError(pub &'static str);

/// Unknown command, or a recognized command with the wrong token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolError;

pub enum ParseOutcome {
    Command(Command),
    ClientError(ClientError),
    ProtocolError(ProtocolError),
}

fn tokenize(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == b' ').filter(|t| !t.is_empty()).collect()
}

fn eq_ci(a: &[u8], b: &[u8]) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Command-argument integers are parsed strictly: any non-digit byte, an
/// empty token, or overflow is a `CLIENT_ERROR`. This is stricter than the
/// stored *value* parse `incr`/`decr` does on a hit (see `tcache_engine`),
/// matching the reference implementation's `safe_strtoul` family.
fn parse_strict_u64(token: &[u8]) -> Option<u64> {
    if token.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in token {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(value)
}

fn parse_strict_i64(token: &[u8]) -> Option<i64> {
    parse_strict_u64(token).and_then(|v| i64::try_from(v).ok())
}

fn parse_strict_u32(token: &[u8]) -> Option<u32> {
    parse_strict_u64(token).and_then(|v| u32::try_from(v).ok())
}

pub fn parse_command(line: &[u8]) -> ParseOutcome {
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return ParseOutcome::ProtocolError(ProtocolError);
    }
    let cmd = tokens[0];

    if (eq_ci(cmd, b"get") || eq_ci(cmd, b"bget")) && tokens.len() >= 2 {
        return ParseOutcome::Command(Command::Get { keys: tokens[1..].iter().map(|t| t.to_vec()).collect() });
    }

    if eq_ci(cmd, b"metaget") && tokens.len() == 3 {
        return ParseOutcome::Command(Command::MetaGet { key: tokens[1].to_vec() });
    }

    if (eq_ci(cmd, b"add") || eq_ci(cmd, b"set") || eq_ci(cmd, b"replace")) && tokens.len() == 6 {
        let op = if eq_ci(cmd, b"add") {
            StoreOp::Add
        } else if eq_ci(cmd, b"set") {
            StoreOp::Set
        } else {
            StoreOp::Replace
        };
        let Some(flags) = parse_strict_u32(tokens[2]) else {
            return ParseOutcome::ClientError(ClientError("bad command line format"));
        };
        let Some(exptime) = parse_strict_i64(tokens[3]) else {
            return ParseOutcome::ClientError(ClientError("bad command line format"));
        };
        let Some(vlen) = parse_strict_u64(tokens[4]) else {
            return ParseOutcome::ClientError(ClientError("bad command line format"));
        };
        return ParseOutcome::Command(Command::Store { op, key: tokens[1].to_vec(), flags, exptime, vlen: vlen as usize });
    }

    if (eq_ci(cmd, b"incr") || eq_ci(cmd, b"decr")) && tokens.len() == 4 {
        let Some(delta) = parse_strict_u64(tokens[2]) else {
            return ParseOutcome::ClientError(ClientError("invalid numeric delta argument"));
        };
        return ParseOutcome::Command(Command::Arith { key: tokens[1].to_vec(), delta, incr: eq_ci(cmd, b"incr") });
    }

    if eq_ci(cmd, b"delete") && (tokens.len() == 2 || tokens.len() == 3) {
        let exptime = if tokens.len() == 3 {
            match parse_strict_i64(tokens[2]) {
                Some(t) => t,
                None => return ParseOutcome::ClientError(ClientError("bad command line format")),
            }
        } else {
            0
        };
        return ParseOutcome::Command(Command::Delete { key: tokens[1].to_vec(), exptime });
    }

    if eq_ci(cmd, b"stats") && tokens.len() >= 1 {
        return ParseOutcome::Command(Command::Stats { args: tokens[1..].iter().map(|t| t.to_vec()).collect() });
    }

    if eq_ci(cmd, b"flush_all") && (tokens.len() == 1 || tokens.len() == 2) {
        let exptime = match tokens.get(1) {
            Some(t) => match parse_strict_i64(t) {
                Some(v) => Some(v),
                None => return ParseOutcome::ClientError(ClientError("bad command line format")),
            },
            None => None,
        };
        return ParseOutcome::Command(Command::FlushAll { exptime });
    }

    if eq_ci(cmd, b"flush_regex") && tokens.len() == 2 {
        return ParseOutcome::Command(Command::FlushRegex { pattern: tokens[1].to_vec() });
    }

    if eq_ci(cmd, b"version") && tokens.len() == 1 {
        return ParseOutcome::Command(Command::Version);
    }

    if eq_ci(cmd, b"quit") && tokens.len() == 1 {
        return ParseOutcome::Command(Command::Quit);
    }

    if eq_ci(cmd, b"verbosity") && tokens.len() == 2 {
        let Some(level) = parse_strict_u32(tokens[1]) else {
            return ParseOutcome::ClientError(ClientError("bad command line format"));
        };
        return ParseOutcome::Command(Command::Verbosity { level });
    }

    ParseOutcome::ProtocolError(ProtocolError)
}

pub fn resp_stored(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"STORED\r\n");
}

pub fn resp_not_stored(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"NOT_STORED\r\n");
}

pub fn resp_deleted(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"DELETED\r\n");
}

pub fn resp_not_found(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"NOT_FOUND\r\n");
}

pub fn resp_end(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"END\r\n");
}

pub fn resp_ok(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"OK\r\n");
}

pub fn resp_version(buf: &mut Vec<u8>, version: &str) {
    buf.extend_from_slice(b"VERSION ");
    buf.extend_from_slice(version.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub fn resp_error(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"ERROR\r\n");
}

pub fn resp_client_error(buf: &mut Vec<u8>, msg: &str) {
    buf.extend_from_slice(b"CLIENT_ERROR ");
    buf.extend_from_slice(msg.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub fn resp_server_error(buf: &mut Vec<u8>, msg: &str) {
    buf.extend_from_slice(b"SERVER_ERROR ");
    buf.extend_from_slice(msg.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub fn resp_value_line(buf: &mut Vec<u8>, key: &[u8], flags: u32, value: &[u8]) {
    buf.extend_from_slice(b"VALUE ");
    buf.extend_from_slice(key);
    buf.push(b' ');
    buf.extend_from_slice(flags.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(value.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
}

pub fn resp_arith_value(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(value.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub fn resp_stat_line(buf: &mut Vec<u8>, name: &str, value: impl std::fmt::Display) {
    buf.extend_from_slice(b"STAT ");
    buf.extend_from_slice(name.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(value.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_multiple_keys() {
        match parse_command(b"get a b c") {
            ParseOutcome::Command(Command::Get { keys }) => {
                assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
            }
            _ => panic!("expected Get"),
        }
    }

    #[test]
    fn parses_set_line() {
        match parse_command(b"set foo 0 0 5") {
            ParseOutcome::Command(Command::Store { op, key, flags, exptime, vlen }) => {
                assert_eq!(op, StoreOp::Set);
                assert_eq!(key, b"foo");
                assert_eq!(flags, 0);
                assert_eq!(exptime, 0);
                assert_eq!(vlen, 5);
            }
            _ => panic!("expected Store"),
        }
    }

    #[test]
    fn rejects_non_numeric_flags_as_client_error() {
        match parse_command(b"set foo x 0 5") {
            ParseOutcome::ClientError(_) => {}
            _ => panic!("expected ClientError"),
        }
    }

    #[test]
    fn unknown_command_is_protocol_error() {
        match parse_command(b"xyzzy") {
            ParseOutcome::ProtocolError(_) => {}
            _ => panic!("expected ProtocolError"),
        }
    }

    #[test]
    fn too_few_tokens_is_protocol_error() {
        match parse_command(b"set") {
            ParseOutcome::ProtocolError(_) => {}
            _ => panic!("expected ProtocolError"),
        }
    }

    #[test]
    fn parses_delete_with_and_without_exptime() {
        match parse_command(b"delete k") {
            ParseOutcome::Command(Command::Delete { key, exptime }) => {
                assert_eq!(key, b"k");
                assert_eq!(exptime, 0);
            }
            _ => panic!("expected Delete"),
        }
        match parse_command(b"delete k 5") {
            ParseOutcome::Command(Command::Delete { exptime, .. }) => assert_eq!(exptime, 5),
            _ => panic!("expected Delete"),
        }
    }
}
