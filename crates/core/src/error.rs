//! Error taxonomy shared by the gateway and the session guard.

/// Failure surfaced by any gateway or session operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// A local precondition failed; the network was never touched.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The backend answered with a non-2xx status.
    #[error("HTTP {code}: {status_text}")]
    HttpStatus {
        /// Numeric status code.
        code: u16,
        /// Reason phrase reported for the status.
        status_text: String,
    },
    /// Transport-level failure (DNS, refused connection, TLS, ...).
    #[error("network error: {0}")]
    Network(String),
    /// A nominally successful response carried a malformed body.
    #[error("parse error: {0}")]
    Parse(String),
    /// A guarded call was rejected as unauthenticated and the local session was torn down.
    #[error("session expired (HTTP {code})")]
    SessionExpired {
        /// Status code that triggered the teardown.
        code: u16,
    },
    /// The durable token store could not be read or written.
    #[error("token store error: {0}")]
    Store(String),
}

impl ApiError {
    /// Numeric status code, when the failure came from the backend.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { code, .. } | ApiError::SessionExpired { code } => Some(*code),
            _ => None,
        }
    }

    /// Whether the backend rejected the call as unauthenticated or forbidden.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::HttpStatus { code: 401 | 403, .. })
    }
}

/// Convenience alias used across the crate.
pub type ApiResult<T> = Result<T, ApiError>;
