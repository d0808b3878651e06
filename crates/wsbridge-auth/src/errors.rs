//! Auth error types.

use wsbridge_http::HttpError;

/// Failure to acquire a credential for one connect attempt.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token request did not complete.
    #[error("token request failed: {0}")]
    Http(#[from] HttpError),

    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint returned {status}: {message}")]
    TokenEndpoint {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The token response was not valid JSON.
    #[error("invalid token response: {0}")]
    Json(#[from] serde_json::Error),

    /// The token response carried no usable access token.
    #[error("token endpoint {0} returned an empty access token")]
    EmptyToken(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
