//! Endpoint descriptors and URI resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::headers::Headers;

/// Invalid or unsupported endpoint configuration.
///
/// Always permanent: retrying the same descriptor cannot succeed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The URI could not be parsed.
    #[error("invalid endpoint URI '{uri}': {reason}")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Parser message.
        reason: String,
    },
    /// Scheme other than `ws` or `wss`.
    #[error("unsupported scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
    /// URI has no host component.
    #[error("endpoint URI '{0}' has no host")]
    MissingHost(String),
}

/// WebSocket URI scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain `ws://`.
    Ws,
    /// TLS `wss://`.
    Wss,
}

impl Scheme {
    /// Port used when the URI does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }

    /// Whether the transport is wrapped in TLS.
    pub fn is_secure(self) -> bool {
        self == Self::Wss
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        })
    }
}

/// OAuth client-credential grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthGrant {
    /// Token endpoint URI.
    pub token_endpoint: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Requested scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Username/password pair for HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredential {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_true() -> bool {
    true
}

/// Everything needed to open and maintain one physical WebSocket connection.
///
/// Immutable once handed to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// `ws://` or `wss://` URI.
    pub uri: String,
    /// Static headers sent with the handshake and inherited by HTTP subscriptions.
    #[serde(default)]
    pub headers: Headers,
    /// OAuth grant; takes precedence over `basic_credential`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_grant: Option<OAuthGrant>,
    /// Basic credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_credential: Option<BasicCredential>,
    /// Whether the keepalive watchdog runs for this endpoint.
    #[serde(default = "default_true")]
    pub ping_enabled: bool,
}

impl EndpointDescriptor {
    /// Descriptor with no headers, no credentials and keepalive enabled.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: Headers::new(),
            oauth_grant: None,
            basic_credential: None,
            ping_enabled: true,
        }
    }

    /// Attach static headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Attach an OAuth client-credential grant.
    #[must_use]
    pub fn with_oauth(mut self, grant: OAuthGrant) -> Self {
        self.oauth_grant = Some(grant);
        self
    }

    /// Attach a Basic credential.
    #[must_use]
    pub fn with_basic(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_credential = Some(BasicCredential {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Enable or disable the keepalive watchdog.
    #[must_use]
    pub fn with_ping(mut self, enabled: bool) -> Self {
        self.ping_enabled = enabled;
        self
    }

    /// Parse and validate the URI.
    pub fn resolve(&self) -> Result<ResolvedEndpoint, ConfigError> {
        let url = Url::parse(self.uri.trim()).map_err(|e| ConfigError::InvalidUri {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;

        let scheme = match url.scheme() {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_owned(),
            _ => return Err(ConfigError::MissingHost(self.uri.clone())),
        };

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        Ok(ResolvedEndpoint {
            scheme,
            host,
            port,
            url,
        })
    }
}

/// Validated endpoint address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// `ws` or `wss`.
    pub scheme: Scheme,
    /// Host name or address literal.
    pub host: String,
    /// Explicit port, or the scheme default.
    pub port: u16,
    /// Full parsed URI including path and query.
    pub url: Url,
}

impl ResolvedEndpoint {
    /// `host:port` suitable for a TCP connect.
    ///
    /// IPv6 literals keep their brackets.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
