//! Translation service error handling.

use transq_core::Error;

/// Failure classes of the translation service, derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorCode {
    /// Missing or invalid credentials.
    AuthenticationError,
    /// Endpoint does not exist.
    NotFound,
    /// Request rejected as malformed or too large.
    BadRequest,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Server error or gateway failure.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl ServiceErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationError,
            404 => Self::NotFound,
            400 | 413 | 422 => Self::BadRequest,
            429 => Self::RateLimitExceeded,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError | Self::Unknown
        )
    }
}

/// Convert a service failure into a transq Error.
///
/// The mapping keeps [`Error::is_retryable`] in agreement with
/// [`ServiceErrorCode::is_retryable`].
pub fn to_transq_error(code: ServiceErrorCode, message: &str) -> Error {
    match code {
        ServiceErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", message))
        }
        ServiceErrorCode::NotFound => {
            Error::Config(format!("Translation endpoint not found: {}", message))
        }
        ServiceErrorCode::BadRequest => {
            Error::InvalidInput(format!("Rejected by translation service: {}", message))
        }
        ServiceErrorCode::RateLimitExceeded => {
            Error::Translation(format!("Rate limit exceeded: {}", message))
        }
        ServiceErrorCode::ServerError => Error::Translation(format!("Server error: {}", message)),
        ServiceErrorCode::Unknown => Error::Translation(message.to_string()),
    }
}
