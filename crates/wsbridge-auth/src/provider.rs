//! Credential acquisition.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use wsbridge_core::{BasicCredential, EndpointDescriptor, Headers, HttpMethod, OAuthGrant};
use wsbridge_http::{HttpClient, HttpRequest};

use crate::errors::AuthError;

pub use wsbridge_core::headers::AUTHORIZATION;

/// Which credential produced an [`AuthHeader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// OAuth bearer token.
    Bearer,
    /// HTTP Basic.
    Basic,
}

/// A computed `Authorization` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    scheme: AuthScheme,
    value: String,
}

impl AuthHeader {
    /// `Bearer <token>`.
    pub fn bearer(token: &str) -> Self {
        Self {
            scheme: AuthScheme::Bearer,
            value: format!("Bearer {token}"),
        }
    }

    /// Credential kind.
    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Full header value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replace any `Authorization` entry in `headers` with this value.
    pub fn apply(&self, headers: &mut Headers) {
        headers.insert(AUTHORIZATION, self.value.clone());
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("scheme", &self.scheme)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// `Basic base64(username:password)`.
pub fn basic_header(credential: &BasicCredential) -> AuthHeader {
    let raw = format!("{}:{}", credential.username, credential.password);
    AuthHeader {
        scheme: AuthScheme::Basic,
        value: format!("Basic {}", STANDARD.encode(raw)),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Computes the `Authorization` header for an endpoint.
#[derive(Clone)]
pub struct AuthProvider {
    http: Arc<dyn HttpClient>,
}

impl AuthProvider {
    /// Provider issuing token requests through `http`.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Header for `endpoint`, or `None` when it has no credentials.
    ///
    /// OAuth takes priority over a Basic credential. Token failures are
    /// returned as-is; there is no internal retry.
    pub async fn authorization_header(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Option<AuthHeader>, AuthError> {
        if let Some(grant) = &endpoint.oauth_grant {
            if endpoint.basic_credential.is_some() {
                debug!(endpoint = %endpoint.uri, "both OAuth and Basic configured, using OAuth");
            }
            return self.fetch_token(grant).await.map(Some);
        }
        Ok(endpoint.basic_credential.as_ref().map(basic_header))
    }

    /// Run the client-credential grant against `grant.token_endpoint`.
    #[instrument(skip_all, fields(token_endpoint = %grant.token_endpoint))]
    pub async fn fetch_token(&self, grant: &OAuthGrant) -> Result<AuthHeader, AuthError> {
        // The serializer is not Send and must not live across the await.
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            let _ = form
                .append_pair("grant_type", "client_credentials")
                .append_pair("client_id", &grant.client_id)
                .append_pair("client_secret", &grant.client_secret);
            if let Some(scope) = grant.scope.as_deref().filter(|s| !s.is_empty()) {
                let _ = form.append_pair("scope", scope);
            }
            form.finish()
        };

        let request = HttpRequest::new(HttpMethod::Post, grant.token_endpoint.clone())
            .with_headers(
                Headers::new()
                    .with("Content-Type", "application/x-www-form-urlencoded")
                    .with("Accept", "application/json"),
            )
            .with_body(body);

        let response = self.http.execute(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "token request rejected");
            return Err(AuthError::TokenEndpoint {
                status: response.status,
                message: response.body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&response.body)?;
        match token.access_token {
            Some(t) if !t.trim().is_empty() => {
                debug!("access token acquired");
                Ok(AuthHeader::bearer(t.trim()))
            }
            _ => Err(AuthError::EmptyToken(grant.token_endpoint.clone())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
