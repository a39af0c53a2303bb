//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sfup_core::TransferError;

/// Status returned when the delivered body failed its integrity check
pub const INTEGRITY_CHECK_FAILED: u16 = 599;

/// [`INTEGRITY_CHECK_FAILED`] as a status code.
#[must_use]
pub fn integrity_check_failed() -> StatusCode {
    StatusCode::from_u16(INTEGRITY_CHECK_FAILED).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Errors surfaced by route handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request
    #[error("{0}")]
    BadRequest(&'static str),

    /// Engine outcome
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ApiError {
    /// Status code for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Transfer(e) => match e {
                TransferError::Unauthorized => StatusCode::UNAUTHORIZED,
                TransferError::InvalidOrConsumed => StatusCode::NOT_FOUND,
                TransferError::AuthenticationFailed => StatusCode::FORBIDDEN,
                TransferError::IntegrityMismatch { .. } => integrity_check_failed(),
                TransferError::InvalidFilename(_) | TransferError::BodyAborted(_) => {
                    StatusCode::BAD_REQUEST
                }
                TransferError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                TransferError::Crypto(_)
                | TransferError::Store(_)
                | TransferError::Io(_)
                | TransferError::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// True for failures on the server side; those are logged as errors.
    fn is_internal(&self) -> bool {
        match self {
            Self::BadRequest(_) => false,
            // logged where the body is delivered
            Self::Transfer(TransferError::IntegrityMismatch { .. }) => false,
            Self::Transfer(e) => !e.is_client_error(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) => (*msg).to_string(),
            Self::Transfer(e) => match e {
                TransferError::Unauthorized => "Sorry, your email is not authorized".into(),
                TransferError::InvalidOrConsumed => "Invalid ID or already used".into(),
                TransferError::AuthenticationFailed => "Invalid key".into(),
                TransferError::IntegrityMismatch { .. } => "Integrity check failed".into(),
                TransferError::InvalidFilename(reason) => format!("Invalid filename: {reason}"),
                TransferError::TooLarge { limit } => {
                    format!("File too large, the limit is {limit} bytes")
                }
                TransferError::BodyAborted(_) => "Upload interrupted".into(),
                _ => "Internal server error".into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_internal() {
            tracing::error!("Internal error: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Request refused: {}", self);
        }

        (status, format!("{}\n", self.message())).into_response()
    }
}

/// Result alias for route handlers
pub type ApiResult<T> = Result<T, ApiError>;
