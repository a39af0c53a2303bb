//! `AES-128-CTR` keystream for file bodies.
//!
//! Counter mode turns AES into a stream cipher, so a body of unknown
//! length can be encrypted chunk by chunk as it arrives, with no padding
//! and no buffering of the whole file. The transform is its own inverse:
//! applying the same keystream twice yields the original bytes.
//!
//! The stream is unauthenticated. Tampering with stored ciphertext is
//! caught at the end of a download by comparing SHA-256 digests (see
//! [`crate::hash`]).

use aes::cipher::{KeyIvInit, StreamCipher as _};

use crate::{CryptoError, STREAM_IV_SIZE, TicketKey, random};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Initial counter block for the body stream (16 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamIv([u8; STREAM_IV_SIZE]);

impl StreamIv {
    /// Create an IV from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; STREAM_IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create an IV from a slice, as loaded back from storage.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidNonceLength` if the slice is not 16 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; STREAM_IV_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidNonceLength {
                expected: STREAM_IV_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Generate a random IV.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the entropy source fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; STREAM_IV_SIZE];
        random::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; STREAM_IV_SIZE] {
        &self.0
    }
}

/// Stateful keystream over one file body.
///
/// Feed chunks in order; the keystream position carries over between
/// calls, so chunk boundaries do not matter.
pub struct StreamCipher {
    inner: Aes128Ctr,
    processed: u64,
}

impl StreamCipher {
    /// Create a keystream for the given key and IV.
    #[must_use]
    pub fn new(key: &TicketKey, iv: &StreamIv) -> Self {
        Self {
            inner: Aes128Ctr::new(key.as_bytes().into(), iv.as_bytes().into()),
            processed: 0,
        }
    }

    /// Keystream for the upload direction (plaintext to ciphertext).
    #[must_use]
    pub fn encryptor(key: &TicketKey, iv: &StreamIv) -> Self {
        Self::new(key, iv)
    }

    /// Keystream for the download direction (ciphertext to plaintext).
    #[must_use]
    pub fn decryptor(key: &TicketKey, iv: &StreamIv) -> Self {
        Self::new(key, iv)
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
        self.processed += buf.len() as u64;
    }

    /// Total bytes transformed so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }
}
