//! Deterministic storage keys derived from labels.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `label` (64 characters).
pub fn sha256_hex(label: &str) -> String {
    hex::encode(Sha256::digest(label.as_bytes()))
}

/// CRC-32 (IEEE) checksum of `label`.
pub fn crc32(label: &str) -> u32 {
    crc32fast::hash(label.as_bytes())
}
