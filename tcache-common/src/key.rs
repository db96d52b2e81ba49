//! # Key Validation
//!
//! Keys are opaque byte strings in the wire protocol, but the store itself
//! never touches a byte that isn't an already-validated key.

use crate::error::{CacheError, CacheResult};

pub const MIN_KEY_LEN: usize = 1;
pub const MAX_KEY_LEN: usize = 250;

/// Validates a key exactly as the reference implementation's tokenizer
/// does: non-empty, within [`MAX_KEY_LEN`], and free of whitespace and
/// control bytes (the tokenizer splits on whitespace, so a key can never
/// legitimately contain any).
pub fn validate_key(key: &[u8]) -> CacheResult<()> {
    if key.len() < MIN_KEY_LEN || key.len() > MAX_KEY_LEN {
        return Err(CacheError::BadKey);
    }
    if key.iter().any(|&b| b <= 0x20 || b == 0x7f) {
        return Err(CacheError::BadKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_key() {
        assert!(validate_key(b"user:1234").is_ok());
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(validate_key(b""), Err(CacheError::BadKey));
    }

    #[test]
    fn rejects_oversize_key() {
        let key = vec![b'a'; MAX_KEY_LEN + 1];
        assert_eq!(validate_key(&key), Err(CacheError::BadKey));
    }

    #[test]
    fn rejects_embedded_whitespace() {
        assert_eq!(validate_key(b"foo bar"), Err(CacheError::BadKey));
    }

    #[test]
    fn rejects_control_byte() {
        assert_eq!(validate_key(b"foo\x01bar"), Err(CacheError::BadKey));
    }

    #[test]
    fn accepts_key_at_max_len() {
        let key = vec![b'a'; MAX_KEY_LEN];
        assert!(validate_key(&key).is_ok());
    }
}
