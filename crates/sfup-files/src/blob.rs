//! Local filesystem blob storage.
//!
//! Each ticket owns at most one blob, stored as `{root}/{ticket_id}`. Blobs
//! hold raw keystream output and are meaningless without the ticket key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};

/// Directory of encrypted ticket blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open blob storage at the given root directory.
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for a ticket.
    #[must_use]
    pub fn path(&self, id: u32) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Create the blob for a ticket.
    ///
    /// Fails with `AlreadyExists` rather than overwriting an existing blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob exists or cannot be created.
    pub async fn create(&self, id: u32) -> std::io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(id))
            .await
    }

    /// Open the blob for a ticket for reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the ticket has no blob.
    pub async fn open_blob(&self, id: u32) -> std::io::Result<File> {
        File::open(self.path(id)).await
    }

    /// Check whether a ticket has a blob.
    pub async fn exists(&self, id: u32) -> bool {
        fs::try_exists(self.path(id)).await.unwrap_or(false)
    }

    /// Remove the blob for a ticket.
    ///
    /// Returns `Ok(())` even if the blob didn't exist (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(&self, id: u32) -> std::io::Result<()> {
        match fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// List ticket ids that currently have a blob.
    ///
    /// Entries whose names are not ticket ids (for example the SQLite
    /// database when it shares the directory) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> std::io::Result<Vec<u32>> {
        let mut ids = Vec::new();

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}
