//! Client error types.

use std::time::Duration;

use wsbridge_core::ConfigError;

/// Why a connection attempt or an established session failed.
///
/// Stored as the client's last error when it enters `ERROR`, so every
/// variant is cheap to clone.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid or unsupported endpoint URI. Never retried.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Credential acquisition failed for this attempt.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Socket, TLS or handshake failure.
    #[error("transport error: {message}")]
    Transport {
        /// Failure description.
        message: String,
        /// The server rejected the handshake with a client-error status.
        permanent: bool,
    },

    /// No pong arrived within the pong timeout.
    #[error("no pong received within {0:?}")]
    KeepaliveTimeout(Duration),

    /// Sending requires a CONNECTED client.
    #[error("not connected")]
    NotConnected,

    /// The protocol configuration has been unlinked.
    #[error("endpoint has been released")]
    Released,
}

impl ClientError {
    /// Transient transport failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            permanent: false,
        }
    }

    /// Permanent transport failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            permanent: true,
        }
    }

    /// Whether a later `connect()` can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Authentication(_) | Self::KeepaliveTimeout(_) => true,
            Self::Transport { permanent, .. } => !permanent,
            Self::Configuration(_) | Self::NotConnected | Self::Released => false,
        }
    }

    /// Retrying the same descriptor cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Transport { permanent: true, .. } | Self::Released
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Authentication(_) => "authentication",
            Self::Transport { permanent: true, .. } => "transport_rejected",
            Self::Transport { .. } => "transport",
            Self::KeepaliveTimeout(_) => "keepalive_timeout",
            Self::NotConnected => "not_connected",
            Self::Released => "released",
        }
    }
}

/// Failure of a single subscription. Logged and collected, never propagated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// HTTP subscription without a URI.
    #[error("http subscription has no uri")]
    MissingUri,

    /// HTTP subscription URI could not be parsed.
    #[error("invalid subscription uri '{uri}': {reason}")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Parser message.
        reason: String,
    },

    /// The call completed with a non-2xx status.
    #[error("{method} {uri} returned {status}")]
    Status {
        /// Method used.
        method: String,
        /// Target URI.
        uri: String,
        /// Response status.
        status: u16,
    },

    /// The call did not complete.
    #[error("{method} {uri} failed: {message}")]
    Call {
        /// Method used.
        method: String,
        /// Target URI.
        uri: String,
        /// Underlying error text.
        message: String,
    },

    /// A message subscription could not be sent.
    #[error("message not sent: {0}")]
    Send(String),

    /// The replay was cancelled before this subscription ran.
    #[error("cancelled before execution")]
    Cancelled,
}
