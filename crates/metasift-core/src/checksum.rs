//! Content keys for locally sourced bytes.
//!
//! Bytes handed in through the raw-bytes override have no URL of their own;
//! they are cached under `sha256:<hex digest>` unless the caller names a key.

use sha2::{Digest, Sha256};

/// Prefix of content-derived cache keys.
pub const CONTENT_KEY_PREFIX: &str = "sha256:";

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Cache key for bytes that did not come from a URL.
pub fn content_key(bytes: &[u8]) -> String {
    format!("{}{}", CONTENT_KEY_PREFIX, sha256_hex(bytes))
}
