//! Ticket identifiers and persisted ticket state.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use sfup_crypto::{CryptoError, MAX_TICKET_ID, SealedField, StreamIv};
use thiserror::Error;

/// Identifier of a single-use ticket, uniform over `[0, 2^31 - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(u32);

impl TicketId {
    /// Wrap a raw id.
    ///
    /// # Errors
    ///
    /// Returns [`ParseTicketIdError::OutOfRange`] if `raw >= 2^31 - 1`.
    pub fn new(raw: u32) -> Result<Self, ParseTicketIdError> {
        if raw < MAX_TICKET_ID {
            Ok(Self(raw))
        } else {
            Err(ParseTicketIdError::OutOfRange(raw))
        }
    }

    /// Draw a fresh random id from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if entropy is unavailable.
    pub fn generate() -> Result<Self, CryptoError> {
        sfup_crypto::random::ticket_id().map(Self)
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = ParseTicketIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u32 = s
            .parse()
            .map_err(|_| ParseTicketIdError::Malformed(s.to_string()))?;
        Self::new(raw)
    }
}

/// A ticket id that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseTicketIdError {
    /// Not a decimal integer
    #[error("malformed ticket id: {0:?}")]
    Malformed(String),

    /// Outside the 31-bit id space
    #[error("ticket id out of range: {0}")]
    OutOfRange(u32),
}

/// Lifecycle state, derived from which fields are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    /// Created, waiting for an upload
    Reserved,
    /// Name and body stored, waiting for a download
    Uploaded,
}

/// Fields written by the single successful upload of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadClaim {
    /// Filename sealed under the ticket key
    pub name: SealedField,
    /// IV of the body stream
    pub file_iv: StreamIv,
}

/// A ticket row as persisted by a [`TicketStore`](crate::store::TicketStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    /// Ticket id
    pub id: TicketId,
    /// Sealed filename, present once uploaded
    pub name: Option<SealedField>,
    /// Body IV, present once uploaded
    pub file_iv: Option<StreamIv>,
    /// Sealed SHA-256 of the plaintext body, present once the body is stored
    pub hash: Option<SealedField>,
    /// Unix seconds of the last reservation or upload claim
    pub last_updated: i64,
}

impl TicketRecord {
    /// A freshly reserved ticket.
    #[must_use]
    pub fn reserved(id: TicketId, now: i64) -> Self {
        Self {
            id,
            name: None,
            file_iv: None,
            hash: None,
            last_updated: now,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TicketState {
        if self.name.is_some() {
            TicketState::Uploaded
        } else {
            TicketState::Reserved
        }
    }
}

/// Current time in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
