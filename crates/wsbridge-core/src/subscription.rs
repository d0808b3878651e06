//! Post-connect actions replayed on every successful connection.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::headers::Headers;

/// Content type used for HTTP subscriptions that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Methods an HTTP subscription may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`.
    #[default]
    #[serde(alias = "get")]
    Get,
    /// `PUT`.
    #[serde(alias = "put")]
    Put,
    /// `POST`.
    #[serde(alias = "post")]
    Post,
}

impl HttpMethod {
    /// Method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared action, replayed in declaration order after each connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Subscription {
    /// Send `body` verbatim over the WebSocket.
    #[serde(rename = "websocket", alias = "message")]
    Message {
        /// Payload. Non-string JSON values are accepted and sent as compact JSON.
        #[serde(deserialize_with = "payload_text")]
        body: String,
    },
    /// Issue a one-shot HTTP call.
    #[serde(rename = "http")]
    Http(HttpSubscription),
}

impl Subscription {
    /// Message subscription.
    pub fn message(body: impl Into<String>) -> Self {
        Self::Message { body: body.into() }
    }

    /// HTTP subscription with default method and content type.
    pub fn http(uri: impl Into<String>) -> Self {
        Self::Http(HttpSubscription::new(uri))
    }
}

impl From<HttpSubscription> for Subscription {
    fn from(sub: HttpSubscription) -> Self {
        Self::Http(sub)
    }
}

/// One HTTP call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSubscription {
    /// Target URI. A missing or unparsable URI skips the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Method, `GET` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    /// Content type, [`DEFAULT_CONTENT_TYPE`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Overrides merged onto the endpoint headers with replace semantics.
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    /// Request body; the entity is omitted when absent.
    #[serde(
        default,
        deserialize_with = "optional_payload_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<String>,
}

impl HttpSubscription {
    /// `GET uri` with no overrides and no body.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Set the method.
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add a header override. An empty `values` list removes the header.
    #[must_use]
    pub fn with_header<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.headers.set(name, values);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Method after defaulting.
    pub fn effective_method(&self) -> HttpMethod {
        self.method.unwrap_or_default()
    }

    /// Content type after defaulting.
    pub fn effective_content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn payload_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(value_to_text)
}

fn optional_payload_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(value_to_text(other)),
    })
}
