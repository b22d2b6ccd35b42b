//! Content digest helper.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `content` as a lowercase hex string.
///
/// This is the `file_hash` recorded in the relational row and checked by
/// the consistency validator after every saga run.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
