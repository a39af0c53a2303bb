//! In-memory ticket store (for tests and throwaway deployments).

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sfup_crypto::SealedField;

use super::TicketStore;
use crate::error::{StoreError, StoreResult};
use crate::ticket::{TicketId, TicketRecord, UploadClaim, unix_now};

/// Ticket store backed by a concurrent map.
///
/// Not persistent: tickets are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: DashMap<TicketId, TicketRecord>,
}

impl MemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// True if no tickets are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Overwrite the `last_updated` stamp of a ticket.
    ///
    /// Returns `false` if the ticket doesn't exist.
    pub fn touch(&self, id: TicketId, last_updated: i64) -> bool {
        match self.tickets.get_mut(&id) {
            Some(mut record) => {
                record.last_updated = last_updated;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, id: TicketId) -> StoreResult<()> {
        match self.tickets.entry(id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(TicketRecord::reserved(id, unix_now()));
                Ok(())
            }
        }
    }

    async fn claim_upload(&self, id: TicketId, claim: &UploadClaim) -> StoreResult<bool> {
        let Some(mut record) = self.tickets.get_mut(&id) else {
            return Ok(false);
        };
        if record.name.is_some() {
            return Ok(false);
        }

        record.name = Some(claim.name.clone());
        record.file_iv = Some(claim.file_iv);
        record.last_updated = unix_now();
        Ok(true)
    }

    async fn attach_hash(&self, id: TicketId, hash: &SealedField) -> StoreResult<()> {
        let mut record = self
            .tickets
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        record.hash = Some(hash.clone());
        Ok(())
    }

    async fn fetch_for_download(&self, id: TicketId) -> StoreResult<TicketRecord> {
        self.tickets
            .get(&id)
            .map(|record| record.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: TicketId) -> StoreResult<bool> {
        Ok(self.tickets.remove(&id).is_some())
    }

    async fn delete_expired(&self, id: TicketId, cutoff: i64) -> StoreResult<bool> {
        Ok(self
            .tickets
            .remove_if(&id, |_, record| record.last_updated < cutoff)
            .is_some())
    }

    async fn expired(&self, cutoff: i64) -> StoreResult<Vec<TicketId>> {
        Ok(self
            .tickets
            .iter()
            .filter(|entry| entry.last_updated < cutoff)
            .map(|entry| *entry.key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_fetch() {
        contract::create_and_fetch(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        contract::duplicate_rejected(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_claim_once() {
        contract::claim_once(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_attach_and_fetch() {
        contract::attach_and_fetch(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        contract::delete_idempotent(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_expiry() {
        contract::expiry(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_delete_expired_spares_refreshed() {
        contract::delete_expired_spares_refreshed(&MemoryTicketStore::new()).await;
    }

    #[tokio::test]
    async fn test_touch_moves_expiry() {
        let store = MemoryTicketStore::new();
        let id = TicketId::new(21).unwrap();
        store.create(id).await.unwrap();

        assert!(store.touch(id, 10));
        assert_eq!(store.expired(11).await.unwrap(), vec![id]);
        assert!(!store.touch(TicketId::new(22).unwrap(), 10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(MemoryTicketStore::new());
        let id = TicketId::new(12).unwrap();
        store.create(id).await.unwrap();

        let mut handles = Vec::new();
        for tag in 0..32u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_upload(id, &contract::claim(tag)).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
