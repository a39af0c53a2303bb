//! File engine error types.

use thiserror::Error;

/// Errors raised while moving bytes between a body, the cipher and storage
#[derive(Debug, Error)]
pub enum FilesError {
    /// Filesystem or sink I/O failed
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound body stream failed before reaching its end
    #[error("body stream error: {0}")]
    Body(String),

    /// The body exceeded the configured size limit
    #[error("body exceeds limit of {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes
        limit: u64,
    },
}

/// Result alias for file engine operations
pub type Result<T> = std::result::Result<T, FilesError>;
