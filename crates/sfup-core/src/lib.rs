//! # SFUP Core
//!
//! Ticket lifecycle for single-use encrypted file drops.
//!
//! This crate provides:
//! - Ticket identifiers and the persisted ticket record
//! - The [`TicketStore`] contract with SQLite and in-memory backends
//! - Notification sinks that deliver upload instructions out of band
//! - The [`TransferEngine`], which owns reserve, upload, download and expiry
//!
//! ## Guarantees
//!
//! - A ticket accepts exactly one upload (`claim_upload` is a conditional
//!   update on an unset name).
//! - A successful key check consumes the ticket; afterwards neither the row
//!   nor the encrypted blob exists.
//! - The per-ticket key is never persisted or logged.
//! - Delivered bytes are checked against a sealed SHA-256 digest.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod store;
pub mod ticket;

pub use config::EngineConfig;
pub use engine::{DownloadReport, PendingDownload, TransferEngine, UploadReceipt};
pub use error::{NotifyError, Result, StoreError, TransferError};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier, SendmailNotifier};
pub use store::{MemoryTicketStore, SqliteTicketStore, TicketStore};
pub use ticket::{TicketId, TicketRecord, TicketState, UploadClaim};
