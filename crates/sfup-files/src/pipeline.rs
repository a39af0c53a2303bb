//! Single-pass encrypt/decrypt pipelines.
//!
//! ```text
//! upload:   body ──► SHA-256 ──► AES-CTR ──► blob
//!                     (plaintext)
//! download: blob ──► AES-CTR ──► SHA-256 ──► sink
//!                                 (plaintext)
//! ```
//!
//! Both directions hash plaintext, so the digest sealed at upload can be
//! compared with the digest recomputed at download. Neither direction holds
//! more than one chunk in memory.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use sfup_crypto::{ContentHasher, Digest, StreamCipher};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::DEFAULT_BUFFER_SIZE;
use crate::error::{FilesError, Result};

/// Outcome of a completed pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Bytes moved through the cipher
    pub bytes: u64,
    /// SHA-256 of the plaintext side
    pub digest: Digest,
}

/// Encrypt an inbound body into `sink`, hashing the plaintext on the way.
///
/// When `limit` is set, the pass fails with [`FilesError::TooLarge`] as soon
/// as the body grows past it; bytes already written stay in the sink and
/// the caller is expected to discard them.
///
/// # Errors
///
/// Returns [`FilesError::Body`] if the body stream yields an error,
/// [`FilesError::TooLarge`] past the limit, and [`FilesError::Io`] if the
/// sink fails.
pub async fn encrypt_stream<S, E, W>(
    mut body: S,
    mut cipher: StreamCipher,
    sink: &mut W,
    limit: Option<u64>,
) -> Result<StreamSummary>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let mut hasher = ContentHasher::new();
    let mut buffer = Vec::with_capacity(DEFAULT_BUFFER_SIZE);

    while let Some(next) = body.next().await {
        let chunk = next.map_err(|e| FilesError::Body(e.to_string()))?;

        if let Some(limit) = limit {
            if hasher.total_len() + chunk.len() as u64 > limit {
                return Err(FilesError::TooLarge { limit });
            }
        }

        hasher.update(&chunk);

        buffer.clear();
        buffer.extend_from_slice(&chunk);
        cipher.apply_keystream(&mut buffer);
        sink.write_all(&buffer).await?;
    }

    sink.flush().await?;

    let bytes = hasher.total_len();
    tracing::trace!(bytes, "body encrypted");

    Ok(StreamSummary {
        bytes,
        digest: hasher.finalize(),
    })
}

/// Decrypt a stored blob into `sink`, hashing the decrypted output.
///
/// Every decrypted byte reaches the sink before the digest is known, so the
/// caller compares digests only after this returns.
///
/// # Errors
///
/// Returns [`FilesError::Io`] if reading the source or writing the sink fails.
pub async fn decrypt_stream<R, W>(
    source: &mut R,
    mut cipher: StreamCipher,
    sink: &mut W,
) -> Result<StreamSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];

    loop {
        let n = source.read(&mut buffer).await?;
        if n == 0 {
            break;
        }

        let chunk = &mut buffer[..n];
        cipher.apply_keystream(chunk);
        hasher.update(chunk);
        sink.write_all(chunk).await?;
    }

    sink.flush().await?;

    let bytes = hasher.total_len();
    tracing::trace!(bytes, "blob decrypted");

    Ok(StreamSummary {
        bytes,
        digest: hasher.finalize(),
    })
}

/// Consume and discard the rest of a body.
///
/// Stops at the first stream error. Returns the number of bytes discarded.
pub async fn drain<S, E>(mut body: S) -> u64
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
{
    let mut discarded = 0u64;
    while let Some(Ok(chunk)) = body.next().await {
        discarded += chunk.len() as u64;
    }
    discarded
}
