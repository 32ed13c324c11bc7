use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::hex::{is_valid_hex, ID_HEX_LEN};

/// Hex length of an ed25519 private key as stored in `*.key` files (64 bytes)
const PRIVATE_KEY_HEX_LEN: usize = ID_HEX_LEN * 2;

/// Read the public key from an identity key file.
///
/// The file holds a hex encoded ed25519 private key whose second half is the
/// public key. A file that already holds a 32-byte public key is accepted too.
pub fn load_public_key(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read identity file {}", path.display()))?;
    let key = raw.trim();

    if is_valid_hex(key, Some(PRIVATE_KEY_HEX_LEN)) {
        return Ok(key[ID_HEX_LEN..].to_lowercase());
    }
    if is_valid_hex(key, Some(ID_HEX_LEN)) {
        return Ok(key.to_lowercase());
    }
    bail!(
        "Identity file {} does not contain a hex encoded key",
        path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_private_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local.key");
        std::fs::write(&path, format!("{}{}\n", "11".repeat(32), "AB".repeat(32))).unwrap();
        assert_eq!(load_public_key(&path).unwrap(), "ab".repeat(32));
    }

    #[test]
    fn test_public_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id.pub");
        std::fs::write(&path, "cd".repeat(32)).unwrap();
        assert_eq!(load_public_key(&path).unwrap(), "cd".repeat(32));
    }

    #[test]
    fn test_bad_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.key");
        std::fs::write(&path, "not a key").unwrap();
        assert!(load_public_key(&path).is_err());
        assert!(load_public_key(&dir.path().join("missing.key")).is_err());
    }
}
