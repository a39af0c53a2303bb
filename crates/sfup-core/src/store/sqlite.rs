//! SQLite ticket store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use sfup_crypto::{FieldNonce, SealedField, StreamIv};

use super::TicketStore;
use crate::error::{StoreError, StoreResult};
use crate::ticket::{TicketId, TicketRecord, UploadClaim, unix_now};

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id INTEGER PRIMARY KEY,
            name BLOB,                      -- AES-GCM sealed filename
            name_nonce BLOB,                -- 12 bytes
            file_iv BLOB,                   -- 16 bytes, AES-CTR
            hash BLOB,                      -- AES-GCM sealed SHA-256
            hash_nonce BLOB,                -- 12 bytes
            last_updated INTEGER NOT NULL   -- Unix timestamp
        );

        CREATE INDEX IF NOT EXISTS idx_tickets_last_updated
            ON tickets(last_updated);
    "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// SQLite-backed ticket store.
///
/// A single connection behind a mutex; every operation is one statement, so
/// SQLite's own atomicity covers the per-id guarantees.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version recorded in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the version table cannot be read.
    pub fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.lock()?;
        let version = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get::<_, Option<u32>>(0)
            })?
            .unwrap_or(0);
        Ok(version)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Rebuild a sealed field from its two columns; both or neither must be set.
fn sealed_column(
    id: TicketId,
    column: &str,
    ciphertext: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
) -> StoreResult<Option<SealedField>> {
    match (ciphertext, nonce) {
        (None, None) => Ok(None),
        (Some(ciphertext), Some(nonce)) => {
            let nonce = FieldNonce::from_slice(&nonce).map_err(|e| StoreError::Corrupt {
                id,
                reason: format!("{column} nonce: {e}"),
            })?;
            Ok(Some(SealedField { nonce, ciphertext }))
        }
        _ => Err(StoreError::Corrupt {
            id,
            reason: format!("{column} set without its nonce"),
        }),
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn create(&self, id: TicketId) -> StoreResult<()> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO tickets (id, last_updated) VALUES (?1, ?2)",
            params![id.get(), unix_now()],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateId(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_upload(&self, id: TicketId, claim: &UploadClaim) -> StoreResult<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE tickets SET name = ?1, name_nonce = ?2, file_iv = ?3, last_updated = ?4 \
             WHERE id = ?5 AND name IS NULL",
            params![
                claim.name.ciphertext,
                claim.name.nonce.as_bytes().as_slice(),
                claim.file_iv.as_bytes().as_slice(),
                unix_now(),
                id.get(),
            ],
        )?;
        Ok(updated == 1)
    }

    async fn attach_hash(&self, id: TicketId, hash: &SealedField) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE tickets SET hash = ?1, hash_nonce = ?2 WHERE id = ?3",
            params![hash.ciphertext, hash.nonce.as_bytes().as_slice(), id.get()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn fetch_for_download(&self, id: TicketId) -> StoreResult<TicketRecord> {
        type Row = (
            Option<Vec<u8>>,
            Option<Vec<u8>>,
            Option<Vec<u8>>,
            Option<Vec<u8>>,
            Option<Vec<u8>>,
            i64,
        );

        let row: Option<Row> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT name, name_nonce, file_iv, hash, hash_nonce, last_updated \
                 FROM tickets WHERE id = ?1",
                [id.get()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((name, name_nonce, file_iv, hash, hash_nonce, last_updated)) = row else {
            return Err(StoreError::NotFound(id));
        };

        let file_iv = file_iv
            .map(|iv| StreamIv::from_slice(&iv))
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                id,
                reason: format!("file iv: {e}"),
            })?;

        Ok(TicketRecord {
            id,
            name: sealed_column(id, "name", name, name_nonce)?,
            file_iv,
            hash: sealed_column(id, "hash", hash, hash_nonce)?,
            last_updated,
        })
    }

    async fn delete(&self, id: TicketId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM tickets WHERE id = ?1", [id.get()])?;
        Ok(deleted == 1)
    }

    async fn delete_expired(&self, id: TicketId, cutoff: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM tickets WHERE id = ?1 AND last_updated < ?2",
            params![id.get(), cutoff],
        )?;
        Ok(deleted == 1)
    }

    async fn expired(&self, cutoff: i64) -> StoreResult<Vec<TicketId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM tickets WHERE last_updated < ?1")?;

        let raw_ids = stmt
            .query_map([cutoff], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut ids = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            match TicketId::new(raw) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!("Skipping ticket row {}: {}", raw, e),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    fn store() -> SqliteTicketStore {
        SqliteTicketStore::in_memory().unwrap()
    }

    #[test]
    fn test_init_schema() {
        assert_eq!(store().schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        contract::create_and_fetch(&store()).await;
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        contract::duplicate_rejected(&store()).await;
    }

    #[tokio::test]
    async fn test_claim_once() {
        contract::claim_once(&store()).await;
    }

    #[tokio::test]
    async fn test_attach_and_fetch() {
        contract::attach_and_fetch(&store()).await;
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        contract::delete_idempotent(&store()).await;
    }

    #[tokio::test]
    async fn test_expiry() {
        contract::expiry(&store()).await;
    }

    #[tokio::test]
    async fn test_delete_expired_spares_refreshed() {
        contract::delete_expired_spares_refreshed(&store()).await;
    }

    #[tokio::test]
    async fn test_expired_reports_undecodable_rows() {
        let store = store();
        store
            .lock()
            .unwrap()
            .execute("INSERT INTO tickets (id, last_updated) VALUES (-5, 0)", [])
            .unwrap();

        let err = store.expired(10).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfup.db");
        let id = TicketId::new(77).unwrap();

        {
            let store = SqliteTicketStore::open(&path).unwrap();
            store.create(id).await.unwrap();
            assert!(store.claim_upload(id, &contract::claim(3)).await.unwrap());
        }

        let store = SqliteTicketStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        let record = store.fetch_for_download(id).await.unwrap();
        assert_eq!(record.name, Some(contract::claim(3).name));
    }

    #[tokio::test]
    async fn test_half_written_field_is_corrupt() {
        let store = store();
        let id = TicketId::new(8).unwrap();
        store.create(id).await.unwrap();

        store
            .lock()
            .unwrap()
            .execute("UPDATE tickets SET name = x'00' WHERE id = 8", [])
            .unwrap();

        let err = store.fetch_for_download(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = std::sync::Arc::new(store());
        let id = TicketId::new(11).unwrap();
        store.create(id).await.unwrap();

        let mut handles = Vec::new();
        for tag in 0..16u8 {
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
    }
}
