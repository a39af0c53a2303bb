//! Ticket persistence.
//!
//! A [`TicketStore`] holds one row per live ticket. Every operation is atomic
//! per id; [`TicketStore::claim_upload`] is the only concurrency control the
//! engine relies on, and [`TicketStore::delete`] doubles as the download
//! claim because it reports whether this caller removed the row.

mod memory;
mod sqlite;

pub use memory::MemoryTicketStore;
pub use sqlite::{SCHEMA_VERSION, SqliteTicketStore};

use async_trait::async_trait;
use sfup_crypto::SealedField;

use crate::error::StoreResult;
use crate::ticket::{TicketId, TicketRecord, UploadClaim};

/// Persistent per-ticket state.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket in the `Reserved` state.
    ///
    /// Returns `StoreError::DuplicateId` if the id is taken.
    async fn create(&self, id: TicketId) -> StoreResult<()>;

    /// Record the sealed name and body IV, only if no name is stored yet.
    ///
    /// Returns `false` if the ticket is missing or already uploaded.
    /// Refreshes `last_updated` on success.
    async fn claim_upload(&self, id: TicketId, claim: &UploadClaim) -> StoreResult<bool>;

    /// Attach the sealed plaintext digest to an uploaded ticket.
    ///
    /// Returns `StoreError::NotFound` if the ticket no longer exists.
    async fn attach_hash(&self, id: TicketId, hash: &SealedField) -> StoreResult<()>;

    /// Load everything needed to serve a download.
    ///
    /// Returns `StoreError::NotFound` if the ticket doesn't exist.
    async fn fetch_for_download(&self, id: TicketId) -> StoreResult<TicketRecord>;

    /// Remove a ticket.
    ///
    /// Idempotent. Returns `true` only for the call that actually removed it.
    async fn delete(&self, id: TicketId) -> StoreResult<bool>;

    /// Remove a ticket only if it was last touched strictly before `cutoff`.
    ///
    /// Returns `false` if the ticket is gone or was refreshed since.
    async fn delete_expired(&self, id: TicketId, cutoff: i64) -> StoreResult<bool>;

    /// Ids of tickets last touched strictly before `cutoff` (unix seconds).
    async fn expired(&self, cutoff: i64) -> StoreResult<Vec<TicketId>>;
}
