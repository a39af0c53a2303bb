//! `AES-128-GCM` sealing for short ticket fields.
//!
//! The filename and the integrity digest are small, bounded values, so they
//! are sealed with an AEAD: the ciphertext hides the value and the tag
//! detects any change to nonce or ciphertext. Every seal draws a fresh
//! random nonce; nonces are never shared between fields or tickets.
//!
//! ## Usage
//!
//! ```
//! use sfup_crypto::{TicketKey, open_field, seal_field};
//!
//! let key = TicketKey::generate().unwrap();
//! let sealed = seal_field(&key, b"report.pdf").unwrap();
//!
//! let name = open_field(&key, &sealed.nonce, &sealed.ciphertext).unwrap();
//! assert_eq!(name, b"report.pdf");
//! ```

use aes_gcm::{
    Aes128Gcm,
    aead::{Aead, KeyInit},
};

use crate::{CryptoError, FIELD_NONCE_SIZE, TAG_SIZE, TicketKey, random};

/// AES-GCM nonce (12 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldNonce([u8; FIELD_NONCE_SIZE]);

impl FieldNonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; FIELD_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice, as loaded back from storage.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidNonceLength` if the slice is not 12 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; FIELD_NONCE_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidNonceLength {
                expected: FIELD_NONCE_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Generate a random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the entropy source fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; FIELD_NONCE_SIZE];
        random::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FIELD_NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &aes_gcm::Nonce<aes_gcm::aead::consts::U12> {
        aes_gcm::Nonce::from_slice(&self.0)
    }
}

/// A sealed field: the nonce it was sealed under plus ciphertext with the
/// authentication tag appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedField {
    /// Nonce used for this field only
    pub nonce: FieldNonce,
    /// Ciphertext followed by the 16-byte tag
    pub ciphertext: Vec<u8>,
}

fn cipher(key: &TicketKey) -> Aes128Gcm {
    Aes128Gcm::new(key.as_bytes().into())
}

/// Seal a short field under the ticket key with a fresh random nonce.
///
/// Returns the nonce and `plaintext.len() + 16` bytes of ciphertext.
///
/// # Errors
///
/// Returns `CryptoError::RandomFailed` if no nonce can be drawn and
/// `CryptoError::EncryptionFailed` if AEAD encryption fails.
pub fn seal_field(key: &TicketKey, plaintext: &[u8]) -> Result<SealedField, CryptoError> {
    let nonce = FieldNonce::generate()?;
    let ciphertext = seal_with_nonce(key, &nonce, plaintext)?;
    Ok(SealedField { nonce, ciphertext })
}

/// Seal with an explicit nonce.
///
/// Only for known-answer tests and deterministic fixtures; production
/// sealing goes through [`seal_field`].
///
/// # Errors
///
/// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
pub fn seal_with_nonce(
    key: &TicketKey,
    nonce: &FieldNonce,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    cipher(key)
        .encrypt(nonce.as_generic(), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Open a sealed field.
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` if the key is wrong or the nonce
/// or ciphertext were altered.
pub fn open_field(
    key: &TicketKey,
    nonce: &FieldNonce,
    ciphertext_and_tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext_and_tag.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    cipher(key)
        .decrypt(nonce.as_generic(), ciphertext_and_tag)
        .map_err(|_| CryptoError::DecryptionFailed)
}
