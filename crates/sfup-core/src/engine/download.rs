//! The consuming half of a download.

use std::fmt;

use sfup_crypto::{Digest, StreamCipher, digests_match};
use sfup_files::{BlobStore, decrypt_stream};
use tokio::fs::File;
use tokio::io::AsyncWrite;

use crate::error::{Result, TransferError};
use crate::ticket::TicketId;

/// Outcome of a download that passed the integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Consumed ticket
    pub ticket_id: TicketId,
    /// Original filename
    pub filename: String,
    /// Plaintext bytes delivered
    pub bytes: u64,
}

/// Removes a ticket's blob when dropped, unless released first.
pub(crate) struct BlobGuard {
    id: TicketId,
    blobs: BlobStore,
    armed: bool,
}

impl BlobGuard {
    pub(crate) fn new(id: TicketId, blobs: BlobStore) -> Self {
        Self {
            id,
            blobs,
            armed: true,
        }
    }

    /// Remove the blob now.
    pub(crate) async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.blobs.remove(self.id.get()).await {
            tracing::error!(ticket = %self.id, "Failed to remove consumed blob: {}", e);
        }
    }
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let id = self.id;
        let blobs = self.blobs.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = blobs.remove(id.get()).await {
                        tracing::error!(ticket = %id, "Failed to remove abandoned blob: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_file(blobs.path(id.get())) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::error!(ticket = %id, "Failed to remove abandoned blob: {}", e);
                    }
                }
            }
        }
        tracing::debug!(ticket = %id, "Download abandoned, blob scheduled for removal");
    }
}

/// An authenticated, already-consumed ticket whose body is ready to stream.
///
/// The ticket row is gone by the time this exists. The blob is removed
/// after [`stream_to`](Self::stream_to) finishes, or in the background if
/// this value is dropped first.
pub struct PendingDownload {
    id: TicketId,
    filename: String,
    size: u64,
    file: File,
    cipher: StreamCipher,
    expected: Digest,
    guard: BlobGuard,
}

impl PendingDownload {
    pub(crate) fn new(
        id: TicketId,
        filename: String,
        size: u64,
        file: File,
        cipher: StreamCipher,
        expected: Digest,
        guard: BlobGuard,
    ) -> Self {
        Self {
            id,
            filename,
            size,
            file,
            cipher,
            expected,
            guard,
        }
    }

    /// Ticket being downloaded.
    #[must_use]
    pub fn ticket_id(&self) -> TicketId {
        self.id
    }

    /// Original filename, recovered from the sealed name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Plaintext length, equal to the stored blob's length.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decrypt the body into `sink`, then remove the blob.
    ///
    /// All bytes are written before the digest can be checked.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::IntegrityMismatch`] if the delivered plaintext
    /// does not hash to the digest sealed at upload, or an I/O error if the
    /// blob or sink fails. The blob is removed in every case.
    pub async fn stream_to<W>(self, sink: &mut W) -> Result<DownloadReport>
    where
        W: AsyncWrite + Unpin,
    {
        let Self {
            id,
            filename,
            mut file,
            size: _,
            cipher,
            expected,
            guard,
        } = self;

        let outcome = decrypt_stream(&mut file, cipher, sink).await;
        drop(file);
        guard.release().await;

        let summary = outcome?;
        if !digests_match(&summary.digest, &expected) {
            tracing::warn!(
                ticket = %id,
                bytes = summary.bytes,
                "Integrity check failed, ticket consumed"
            );
            return Err(TransferError::IntegrityMismatch {
                bytes: summary.bytes,
            });
        }

        tracing::info!(ticket = %id, bytes = summary.bytes, "Download complete, ticket consumed");
        Ok(DownloadReport {
            ticket_id: id,
            filename,
            bytes: summary.bytes,
        })
    }
}

impl fmt::Debug for PendingDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDownload")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
