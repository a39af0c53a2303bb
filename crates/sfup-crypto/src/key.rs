//! Per-ticket symmetric key.
//!
//! A fresh key is generated for every upload and handed back to the
//! uploader inside the download URL. The server never stores it; every
//! decryption requires the caller to supply it again.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, KEY_SIZE, constant_time, random};

/// 128-bit ticket key.
///
/// Key material is zeroized on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TicketKey([u8; KEY_SIZE]);

impl TicketKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a random key from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the entropy source fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        random::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 16 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Decode a key from unpadded URL-safe base64, as carried in download links.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyEncoding` for malformed text and
    /// `CryptoError::InvalidKeyLength` if the decoded key is not 16 bytes.
    pub fn from_base64url(text: &str) -> Result<Self, CryptoError> {
        let mut decoded = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Encode the key as unpadded URL-safe base64.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for TicketKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time::ct_eq(&self.0, &other.0)
    }
}

impl Eq for TicketKey {}

impl std::fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TicketKey(<redacted>)")
    }
}
