//! Content fingerprinting for partition files
//!
//! A partition's fingerprint is the SHA-256 of its serialized record set,
//! hex-encoded. The loader compares fingerprints to decide whether a
//! partition changed since it was last loaded.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of an in-memory byte slice
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_bytes() {
        let fp = fingerprint_bytes(b"hello world");
        assert_eq!(fp, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        assert_ne!(fingerprint_bytes(b"a"), fingerprint_bytes(b"b"));
    }
}
