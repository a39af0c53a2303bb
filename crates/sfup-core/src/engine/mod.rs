//! Ticket lifecycle: reserve, upload, download, expire.
//!
//! ```text
//!             reserve            upload                 download
//!   (none) ───────────► Reserved ───────► Uploaded ─────────────────► (gone)
//!                          │                 │      wrong key: stays
//!                          └──── expiry ─────┴──────────────────────► (gone)
//! ```
//!
//! The key exists only in memory for the duration of an upload request and
//! in the download URL handed back to the uploader. Every field that could
//! identify the file is sealed under it.

mod download;

pub use download::{DownloadReport, PendingDownload};

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use sfup_crypto::{Digest, StreamCipher, StreamIv, TicketKey, open_field, seal_field};
use sfup_files::{BlobStore, drain, encrypt_stream};
use tokio::io::AsyncWrite;

use crate::config::EngineConfig;
use crate::error::{Result, StoreError, TransferError};
use crate::notify::{Notification, Notifier};
use crate::store::TicketStore;
use crate::ticket::{TicketId, UploadClaim};
use download::BlobGuard;

/// Redraws allowed when a fresh id collides with a live ticket
pub const MAX_ID_ATTEMPTS: u32 = 8;

/// Longest accepted filename, in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Result of a successful upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Ticket the body was stored under
    pub ticket_id: TicketId,
    /// Single-use download URL carrying the key
    pub download_url: String,
    /// Plaintext bytes stored
    pub bytes: u64,
}

impl fmt::Debug for UploadReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadReceipt")
            .field("ticket_id", &self.ticket_id)
            .field("download_url", &"<redacted>")
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Directory components are stripped. The remaining name must be non-empty,
/// at most [`MAX_FILENAME_LEN`] bytes, free of control characters, and not
/// `.` or `..`.
///
/// # Errors
///
/// Returns [`TransferError::InvalidFilename`] describing the first violation.
pub fn validate_filename(raw: &str) -> Result<String> {
    let base = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(TransferError::InvalidFilename("empty name".into()));
    }
    if base.len() > MAX_FILENAME_LEN {
        return Err(TransferError::InvalidFilename(format!(
            "longer than {MAX_FILENAME_LEN} bytes"
        )));
    }
    if base.chars().any(char::is_control) {
        return Err(TransferError::InvalidFilename(
            "contains control characters".into(),
        ));
    }

    Ok(base.to_string())
}

fn download_url(base_url: &str, id: TicketId, key: &TicketKey) -> String {
    format!(
        "{}/dl/{}?key={}",
        base_url.trim_end_matches('/'),
        id,
        key.to_base64url()
    )
}

/// Orchestrates tickets across the store, the blob directory and the
/// notification sink.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn TicketStore>,
    blobs: BlobStore,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl TransferEngine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        store: Arc<dyn TicketStore>,
        blobs: BlobStore,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            notifier,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Blob directory.
    #[must_use]
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Reserve a ticket for an allow-listed address and send it the upload
    /// instructions.
    ///
    /// The id is only revealed through the notification.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Unauthorized`] if `email` is not allow-listed; no
    ///   ticket is created and nothing is sent.
    /// - [`TransferError::Notify`] if delivery fails; the ticket is removed.
    pub async fn reserve(&self, email: &str, base_url: &str) -> Result<TicketId> {
        let email = email.trim();
        if !self.config.is_allowed(email) {
            tracing::warn!("Reservation refused for {}", email);
            return Err(TransferError::Unauthorized);
        }

        let id = self.create_ticket().await?;

        let notification = Notification {
            recipient: email.to_string(),
            ticket_id: id,
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::error!(ticket = %id, "Notification failed, dropping reservation: {}", e);
            self.discard(id).await;
            return Err(e.into());
        }

        tracing::info!(ticket = %id, "Reserved ticket for {}", email);
        Ok(id)
    }

    async fn create_ticket(&self) -> Result<TicketId> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let id = TicketId::generate()?;
            match self.store.create(id).await {
                Ok(()) => return Ok(id),
                Err(StoreError::DuplicateId(_)) if attempt < MAX_ID_ATTEMPTS => {
                    tracing::debug!(attempt, "Ticket id collision, drawing again");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Store the body for a reserved ticket, encrypted under a fresh key.
    ///
    /// The body is hashed, encrypted and written in one pass. Any failure
    /// after the ticket was claimed removes both the ticket and the partial
    /// blob.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InvalidFilename`] for an unusable filename.
    /// - [`TransferError::InvalidOrConsumed`] if the ticket is unknown or
    ///   already has an upload; the body is drained.
    /// - [`TransferError::TooLarge`] past `max_file_size`.
    /// - [`TransferError::BodyAborted`] if the body stream fails.
    pub async fn upload<S, E>(
        &self,
        id: TicketId,
        filename: &str,
        body: S,
        base_url: &str,
    ) -> Result<UploadReceipt>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send,
        E: fmt::Display,
    {
        let filename = validate_filename(filename)?;

        let key = TicketKey::generate()?;
        let claim = UploadClaim {
            name: seal_field(&key, filename.as_bytes())?,
            file_iv: StreamIv::generate()?,
        };

        if !self.store.claim_upload(id, &claim).await? {
            let discarded = drain(body).await;
            tracing::warn!(ticket = %id, discarded, "Upload refused: invalid or used ticket");
            return Err(TransferError::InvalidOrConsumed);
        }

        let bytes = match self.store_body(id, &key, &claim.file_iv, body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(ticket = %id, "Upload failed, rolling back: {}", e);
                self.discard(id).await;
                return Err(e);
            }
        };

        tracing::info!(ticket = %id, bytes, "Upload stored");
        Ok(UploadReceipt {
            ticket_id: id,
            download_url: download_url(base_url, id, &key),
            bytes,
        })
    }

    async fn store_body<S, E>(
        &self,
        id: TicketId,
        key: &TicketKey,
        iv: &StreamIv,
        body: S,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send,
        E: fmt::Display,
    {
        // a leftover blob can only belong to a dead ticket with the same id
        self.blobs.remove(id.get()).await?;
        let mut file = self.blobs.create(id.get()).await?;

        let summary = encrypt_stream(
            body,
            StreamCipher::encryptor(key, iv),
            &mut file,
            self.config.max_file_size,
        )
        .await?;
        file.sync_all().await?;
        drop(file);

        let sealed = seal_field(key, &summary.digest)?;
        self.store.attach_hash(id, &sealed).await?;

        Ok(summary.bytes)
    }

    /// Authenticate a download and consume the ticket.
    ///
    /// A wrong key leaves the ticket untouched. Once the key opens both
    /// sealed fields the ticket row is deleted, so at most one caller ever
    /// receives a [`PendingDownload`] for a given upload.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InvalidOrConsumed`] if the ticket is unknown, not
    ///   yet uploaded, or consumed concurrently.
    /// - [`TransferError::AuthenticationFailed`] if `key` does not open the
    ///   sealed name or digest.
    /// - [`TransferError::IntegrityMismatch`] (with zero bytes) if the key is
    ///   right but the stored digest or blob is missing; the ticket is
    ///   consumed.
    pub async fn open_download(&self, id: TicketId, key: &TicketKey) -> Result<PendingDownload> {
        let record = match self.store.fetch_for_download(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Err(TransferError::InvalidOrConsumed),
            Err(e) => return Err(e.into()),
        };

        let (Some(sealed_name), Some(file_iv)) = (record.name, record.file_iv) else {
            tracing::debug!(ticket = %id, "Download of a ticket with no upload");
            return Err(TransferError::InvalidOrConsumed);
        };

        let name = open_field(key, &sealed_name.nonce, &sealed_name.ciphertext).map_err(|_| {
            tracing::warn!(ticket = %id, "Download key rejected");
            TransferError::AuthenticationFailed
        })?;

        let expected = match record.hash {
            Some(sealed_hash) => {
                let plain = open_field(key, &sealed_hash.nonce, &sealed_hash.ciphertext)
                    .map_err(|_| TransferError::AuthenticationFailed)?;
                Digest::try_from(plain.as_slice()).ok()
            }
            None => None,
        };

        let Some(expected) = expected else {
            tracing::error!(ticket = %id, "Ticket has no usable digest, consuming it");
            self.discard(id).await;
            return Err(TransferError::IntegrityMismatch { bytes: 0 });
        };

        // opened while the row still exists; the orphan sweep may unlink the
        // path as soon as the row is gone
        let opened = self.blobs.open_blob(id.get()).await;

        if !self.store.delete(id).await? {
            return Err(TransferError::InvalidOrConsumed);
        }
        let guard = BlobGuard::new(id, self.blobs.clone());

        let file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(ticket = %id, "Blob missing for uploaded ticket");
                return Err(TransferError::IntegrityMismatch { bytes: 0 });
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        Ok(PendingDownload::new(
            id,
            String::from_utf8_lossy(&name).into_owned(),
            size,
            file,
            StreamCipher::decryptor(key, &file_iv),
            expected,
            guard,
        ))
    }

    /// Authenticate, stream and consume in one call.
    ///
    /// # Errors
    ///
    /// See [`open_download`](Self::open_download) and
    /// [`PendingDownload::stream_to`].
    pub async fn download<W>(
        &self,
        id: TicketId,
        key: &TicketKey,
        sink: &mut W,
    ) -> Result<DownloadReport>
    where
        W: AsyncWrite + Unpin,
    {
        self.open_download(id, key).await?.stream_to(sink).await
    }

    /// Remove tickets idle for longer than the configured TTL, and blobs
    /// that no longer belong to any ticket.
    ///
    /// Returns the number of tickets removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or blob directory cannot be listed.
    pub async fn sweep_expired(&self, now: i64) -> Result<usize> {
        let ttl = i64::try_from(self.config.ticket_ttl.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(ttl);

        let mut swept = 0;
        for id in self.store.expired(cutoff).await? {
            // an upload may have refreshed the ticket since it was listed
            if !self.store.delete_expired(id, cutoff).await? {
                continue;
            }
            swept += 1;
            if let Err(e) = self.blobs.remove(id.get()).await {
                tracing::warn!(ticket = %id, "Failed to remove expired blob: {}", e);
            }
        }

        let orphans = self.remove_orphan_blobs().await?;

        if swept > 0 || orphans > 0 {
            tracing::info!(swept, orphans, "Expiry sweep finished");
        }
        Ok(swept)
    }

    async fn remove_orphan_blobs(&self) -> Result<usize> {
        let mut removed = 0;
        for raw in self.blobs.list().await? {
            let Ok(id) = TicketId::new(raw) else {
                continue;
            };
            match self.store.fetch_for_download(id).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => match self.blobs.remove(raw).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(ticket = %id, "Failed to remove orphan blob: {}", e),
                },
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Best-effort removal of a ticket and its blob.
    async fn discard(&self, id: TicketId) {
        if let Err(e) = self.store.delete(id).await {
            tracing::error!(ticket = %id, "Failed to delete ticket: {}", e);
        }
        if let Err(e) = self.blobs.remove(id.get()).await {
            tracing::error!(ticket = %id, "Failed to remove blob: {}", e);
        }
    }
}
