//! WPS protocol error types.

use thiserror::Error;

/// OWS exception code signalling a forbidden request.
pub const ACCESS_FORBIDDEN: &str = "AccessForbidden";

/// Errors raised by the WPS transport and document parsing.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The server refused the request (OWS `AccessForbidden`, HTTP 401/403).
    #[error("access forbidden: {reason}")]
    AccessForbidden { reason: String },

    /// The server answered with an OWS `ExceptionReport`.
    #[error("service exception [{code}]: {text}")]
    Exception {
        code: String,
        locator: Option<String>,
        text: String,
    },

    /// Non-2xx HTTP response without a parseable exception report.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The response body was not a document we understand.
    #[error("failed to parse WPS response: {reason}")]
    Parse { reason: String },

    /// Local I/O while reading referenced content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Whether this error means the caller is not authorized.
    pub fn is_access_forbidden(&self) -> bool {
        match self {
            ServiceError::AccessForbidden { .. } => true,
            ServiceError::Exception { code, .. } => code == ACCESS_FORBIDDEN,
            ServiceError::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}
