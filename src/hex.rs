// Hex helpers for public keys and ATX ids

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Length in hex characters of a public key or an ATX id (32 bytes)
pub const ID_HEX_LEN: usize = 64;

/// Check that `value` is non-empty hexadecimal, optionally of an exact length.
/// Both upper and lower case digits are accepted.
pub fn is_valid_hex(value: &str, length: Option<usize>) -> bool {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    match length {
        Some(expected) => value.len() == expected,
        None => true,
    }
}

/// Shorthand for the common 64-character check
pub fn is_valid_id_hex(value: &str) -> bool {
    is_valid_hex(value, Some(ID_HEX_LEN))
}

/// Shorten a hex string for display, keeping `visible_chars` on each side
pub fn truncate_hex(value: &str, visible_chars: usize) -> String {
    if value.len() <= visible_chars * 2 || !value.is_ascii() {
        return value.to_string();
    }
    let start = &value[..visible_chars];
    let end = &value[value.len() - visible_chars..];
    format!("{start}...{end}")
}

/// Decode standard base64 and re-encode the bytes as lowercase hex
pub fn base64_to_hex(value: &str) -> Option<String> {
    STANDARD.decode(value.trim()).ok().map(hex::encode)
}
