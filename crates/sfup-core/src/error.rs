//! Error types for SFUP core.
//!
//! Errors fall in two groups:
//!
//! - **Client outcomes**: the request cannot be honored as asked (not on the
//!   allow-list, ticket gone, wrong key, bad filename, body too large). These
//!   map to 4xx responses and are logged at `warn` or below.
//! - **Infrastructure failures**: storage, filesystem, entropy, or the
//!   notification command. These are logged in full and surface as a
//!   generic server error.
//!
//! [`TransferError::IntegrityMismatch`] sits apart: the bytes were already
//! delivered and the ticket consumed, but the digest did not match.

use sfup_crypto::CryptoError;
use sfup_files::FilesError;
use thiserror::Error;

use crate::ticket::TicketId;

/// Result alias for transfer engine operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Result alias for ticket store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the transfer engine
#[derive(Debug, Error)]
pub enum TransferError {
    /// Requester e-mail is not on the allow-list
    #[error("e-mail address is not authorized")]
    Unauthorized,

    /// Ticket does not exist, is not ready, or was already used
    #[error("invalid ticket or already used")]
    InvalidOrConsumed,

    /// The supplied key does not open the ticket's sealed fields
    #[error("ticket key rejected")]
    AuthenticationFailed,

    /// The delivered body does not match the digest sealed at upload
    #[error("integrity check failed after {bytes} bytes")]
    IntegrityMismatch {
        /// Bytes delivered before the check
        bytes: u64,
    },

    /// Filename is empty, too long, or not a plain basename
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// Upload body exceeds the configured limit
    #[error("upload exceeds limit of {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes
        limit: u64,
    },

    /// The client body stream failed before completion
    #[error("upload body aborted: {0}")]
    BodyAborted(String),

    /// Cryptographic primitive failure (entropy, cipher setup)
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Ticket store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Blob I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Notification could not be delivered
    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

impl TransferError {
    /// True if the error describes a problem with the request rather than
    /// with the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized
                | Self::InvalidOrConsumed
                | Self::AuthenticationFailed
                | Self::InvalidFilename(_)
                | Self::TooLarge { .. }
                | Self::BodyAborted(_)
        )
    }
}

impl From<FilesError> for TransferError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::Io(e) => Self::Io(e),
            FilesError::Body(msg) => Self::BodyAborted(msg),
            FilesError::TooLarge { limit } => Self::TooLarge { limit },
        }
    }
}

/// Errors raised by ticket stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// A ticket with this id already exists
    #[error("duplicate ticket id {0}")]
    DuplicateId(TicketId),

    /// No ticket with this id
    #[error("ticket {0} not found")]
    NotFound(TicketId),

    /// A stored row has inconsistent or malformed columns
    #[error("ticket {id} is corrupt: {reason}")]
    Corrupt {
        /// Affected ticket
        id: TicketId,
        /// What was wrong with it
        reason: String,
    },

    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A previous holder of the store lock panicked
    #[error("store lock poisoned")]
    Poisoned,

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors raised by notification sinks
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Recipient address would corrupt the message headers
    #[error("invalid recipient address")]
    InvalidRecipient,

    /// Spawning or talking to the mail command failed
    #[error("mail command I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The mail command exited unsuccessfully
    #[error("mail command exited with {0}")]
    CommandFailed(String),

    /// Sink-specific failure
    #[error("{0}")]
    Rejected(String),
}
