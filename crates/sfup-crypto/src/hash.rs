//! SHA-256 integrity digests.
//!
//! The digest is always computed over plaintext: on upload before the
//! keystream is applied, on download after it is removed. Comparing the two
//! detects any corruption of the stored ciphertext.

use sha2::{Digest as _, Sha256};

use crate::{DIGEST_SIZE, constant_time};

/// SHA-256 output (32 bytes).
pub type Digest = [u8; DIGEST_SIZE];

/// Compute the SHA-256 digest of input data.
#[must_use]
pub fn digest(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// Compare two digests in constant time.
#[must_use]
pub fn digests_match(a: &Digest, b: &Digest) -> bool {
    constant_time::verify_32(a, b)
}

/// Incremental SHA-256 over a streamed body.
#[derive(Clone, Default)]
pub struct ContentHasher {
    hasher: Sha256,
    total_len: u64,
}

impl ContentHasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.total_len += data.len() as u64;
    }

    /// Get total bytes hashed so far.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Finalize and return the digest.
    #[must_use]
    pub fn finalize(self) -> Digest {
        self.hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty_string() {
        // FIPS 180-2 vector
        assert_eq!(
            hex::encode(digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            hex::encode(digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");

        assert_eq!(hasher.total_len(), 11);
        assert_eq!(hasher.finalize(), digest(b"hello world"));
    }

    #[test]
    fn test_digests_match() {
        let a = digest(b"input1");
        let b = digest(b"input2");

        assert!(digests_match(&a, &a));
        assert!(!digests_match(&a, &b));
    }
}
