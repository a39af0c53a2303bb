//! # SFUP Crypto
//!
//! Cryptographic envelope for single-use file tickets.
//!
//! This crate provides:
//! - Random 31-bit ticket identifiers from the OS CSPRNG
//! - Per-ticket 128-bit keys, zeroized on drop
//! - Authenticated sealing of short fields (filename, digest)
//! - Unauthenticated counter-mode stream transform for file bodies
//! - SHA-256 integrity digests with constant-time comparison
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Field sealing | AES-128-GCM | 96-bit random nonce, 128-bit tag |
//! | Body stream | AES-128-CTR | 128-bit random IV, big-endian counter |
//! | Integrity digest | SHA-256 | computed over plaintext, sealed with GCM |
//! | Key / id source | OS CSPRNG | no userspace fallback |
//!
//! The body is streamed through CTR rather than an AEAD so that files of
//! unknown length pass through in a single pass. End-to-end integrity comes
//! from the sealed SHA-256 digest, checked once the whole body has been
//! decrypted.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod constant_time;
pub mod error;
pub mod hash;
pub mod key;
pub mod random;
pub mod stream;

pub use aead::{FieldNonce, SealedField, open_field, seal_field};
pub use error::CryptoError;
pub use hash::{ContentHasher, Digest, digest, digests_match};
pub use key::TicketKey;
pub use stream::{StreamCipher, StreamIv};

/// Ticket key size (16 bytes / 128 bits)
pub const KEY_SIZE: usize = 16;

/// AES-GCM nonce size
pub const FIELD_NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// AES-CTR initialization vector size (one AES block)
pub const STREAM_IV_SIZE: usize = 16;

/// SHA-256 output size
pub const DIGEST_SIZE: usize = 32;

/// Exclusive upper bound for ticket identifiers (`2^31 - 1`)
pub const MAX_TICKET_ID: u32 = 0x7FFF_FFFF;
