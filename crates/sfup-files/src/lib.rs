//! # SFUP Files
//!
//! File engine for SFUP tickets.
//!
//! This crate provides:
//! - Local blob storage keyed by ticket id
//! - Single-pass upload pipeline: hash plaintext, encrypt, write blob
//! - Single-pass download pipeline: read blob, decrypt, hash plaintext, write sink
//! - Draining of request bodies that will not be stored

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod error;
pub mod pipeline;

pub use blob::BlobStore;
pub use error::FilesError;
pub use pipeline::{StreamSummary, decrypt_stream, drain, encrypt_stream};

/// Read buffer size for blob decryption (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
