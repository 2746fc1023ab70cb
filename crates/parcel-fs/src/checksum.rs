//! `sha256:<hex>` digests of downloaded bytes.

use sha2::{Digest, Sha256};

const PREFIX: &str = "sha256:";

/// Digest of `content` as `sha256:<hex>`.
pub fn sha256(content: &[u8]) -> String {
    format!("{PREFIX}{:x}", Sha256::digest(content))
}

/// Whether `checksum` is the digest of `content`; the prefix is optional.
pub fn matches(content: &[u8], checksum: &str) -> bool {
    let expected = checksum.strip_prefix(PREFIX).unwrap_or(checksum);
    sha256(content)[PREFIX.len()..].eq_ignore_ascii_case(expected)
}
