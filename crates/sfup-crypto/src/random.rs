//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG. A failing entropy
//! source is reported to the caller; there is no weaker fallback.

use crate::{CryptoError, MAX_TICKET_ID};

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Draw a ticket identifier uniformly from `[0, MAX_TICKET_ID)`.
///
/// Ticket ids double as unauthenticated lookup keys in URLs, so they must be
/// unpredictable. A 32-bit draw is masked to 31 bits and the single value
/// `MAX_TICKET_ID` is rejected, which keeps the distribution uniform.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn ticket_id() -> Result<u32, CryptoError> {
    loop {
        let candidate = random_u32()? & MAX_TICKET_ID;
        if candidate < MAX_TICKET_ID {
            return Ok(candidate);
        }
    }
}

/// Generate a random 32-bit value.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_u32() -> Result<u32, CryptoError> {
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
