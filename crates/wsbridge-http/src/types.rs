//! Request/response types and the [`HttpClient`] seam.

use async_trait::async_trait;
use wsbridge_core::{Headers, HttpMethod};

/// Errors raised before a response status is available.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The underlying client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
    /// The request timed out.
    #[error("request to {url} timed out")]
    Timeout {
        /// Target URL.
        url: String,
    },
    /// Connection, TLS or protocol failure.
    #[error("request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying error text.
        message: String,
    },
    /// The response body could not be read.
    #[error("failed to read response body from {url}: {message}")]
    Body {
        /// Target URL.
        url: String,
        /// Underlying error text.
        message: String,
    },
}

/// One outbound call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Headers, emitted one line per value.
    pub headers: Headers,
    /// Entity body. `None` sends no entity.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Request with no headers and no body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Replace the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the entity body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A completed exchange, whatever its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
    /// Content-Type header value.
    pub content_type: Option<String>,
}

impl HttpResponse {
    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one-shot HTTP calls.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform `request`. Non-2xx statuses are returned, not raised.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let mut r = HttpResponse {
            status: 204,
            body: String::new(),
            content_type: None,
        };
        assert!(r.is_success());
        r.status = 301;
        assert!(!r.is_success());
        r.status = 199;
        assert!(!r.is_success());
    }

    #[test]
    fn timeout_display_names_url() {
        let err = HttpError::Timeout {
            url: "http://h/token".into(),
        };
        assert_eq!(err.to_string(), "request to http://h/token timed out");
    }
}
