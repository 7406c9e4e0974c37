//! Base64 text encoding for shipping binary bundles through text channels.
//!
//! Decoding untrusted input should go through [`sanity_check_base64`] (or
//! [`decode_base64_checked`]) first, so that malformed input is reported as a
//! validation failure rather than a decode failure.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use crate::error::{ArchiveError, Result};

/// Encode bytes with the standard alphabet and `=` padding
pub fn encode_base64(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Decode standard, padded base64
pub fn decode_base64(coded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(coded)
        .map_err(|e| ArchiveError::InvalidEncoding(e.to_string()))
}

/// Validate and then decode
pub fn decode_base64_checked(coded: &str) -> Result<Vec<u8>> {
    if !sanity_check_base64(coded) {
        return Err(ArchiveError::InvalidEncoding(format!(
            "not well-formed base64 ({} bytes)",
            coded.len()
        )));
    }
    decode_base64(coded)
}

/// Check whether a string is well-formed padded base64: only alphabet
/// characters, a length that is a multiple of four, and at most two `=`
/// which may only appear at the very end.
pub fn sanity_check_base64(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return false;
    }
    let body_len = bytes.iter().rposition(|&b| b != b'=').map_or(0, |p| p + 1);
    let padding = bytes.len() - body_len;
    if padding > 2 {
        return false;
    }
    bytes[..body_len]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// URL- and filename-safe form: the standard encoding with `+` replaced by
/// `-` and `/` by `_`. Padding is kept.
pub fn encode_base64_url(raw: &[u8]) -> String {
    URL_SAFE.encode(raw)
}
