use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Credentials were rejected at login, or a freshly issued token was
    /// rejected again. Needs operator attention; never retried.
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: StatusCode, message: String },

    /// Non-auth HTTP failure from the data endpoint.
    #[error("HTTP error {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// Transport fault: connect, DNS, TLS or timeout. No status available.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response that did not have the expected shape.
    #[error("Unexpected payload: {0}")]
    PayloadShape(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a failed login response. Every login failure is an auth fault.
    pub fn from_login_status(status: StatusCode, body: &str) -> Self {
        ApiError::Auth {
            status,
            message: Self::truncate_body(body),
        }
    }

    /// Classify a failed data response that will not be retried.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Auth {
                status,
                message: format!("token rejected after re-authentication: {}", truncated),
            },
            _ => ApiError::Http {
                status,
                body: truncated,
            },
        }
    }

    /// True for faults that need new credentials rather than a later retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }

    /// True for faults that are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Http { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            ApiError::PayloadShape(_) => None,
        }
    }
}
