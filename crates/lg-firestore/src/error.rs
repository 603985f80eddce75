//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Backoff hint used when a 429 carries no usable Retry-After.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Map an HTTP status and body to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_MS),
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status this error corresponds to, when known.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-provided backoff, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode(),
            Self::RateLimited(_) | Self::ServerError(..) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_mapping() {
        assert!(matches!(FirestoreError::from_http_status(429, "slow down"), FirestoreError::RateLimited(_)));
        assert!(matches!(FirestoreError::from_http_status(503, "unavailable"), FirestoreError::ServerError(503, _)));
        assert!(matches!(FirestoreError::from_http_status(400, "bad"), FirestoreError::RequestFailed(_)));
        assert!(matches!(FirestoreError::from_http_status(404, "gone"), FirestoreError::NotFound(_)));
        assert!(matches!(FirestoreError::from_http_status(409, "dup"), FirestoreError::AlreadyExists(_)));
        assert!(matches!(FirestoreError::from_http_status(403, "no"), FirestoreError::PermissionDenied(_)));
    }

    #[test]
    fn test_retryability() {
        assert!(FirestoreError::from_http_status(500, "boom").is_retryable());
        assert!(FirestoreError::from_http_status(429, "slow down").is_retryable());
        assert!(!FirestoreError::from_http_status(400, "bad").is_retryable());
        assert!(!FirestoreError::from_http_status(409, "dup").is_retryable());
        assert!(!FirestoreError::auth_error("no creds").is_retryable());
    }

    #[test]
    fn test_http_status_and_retry_after() {
        assert_eq!(FirestoreError::RateLimited(2000).http_status(), Some(429));
        assert_eq!(FirestoreError::RateLimited(2000).retry_after_ms(), Some(2000));
        assert_eq!(FirestoreError::ServerError(502, "bad gateway".into()).http_status(), Some(502));
        assert_eq!(FirestoreError::ServerError(502, "bad gateway".into()).retry_after_ms(), None);
        assert_eq!(FirestoreError::InvalidResponse("x".into()).http_status(), None);
    }
}
