//! Externally visible connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of one endpoint's connection.
///
/// ```text
/// DISCONNECTED -> CONNECTING -> HANDSHAKING -> CONNECTED
///                      \             \            \
///                       +-------------+------------+--> ERROR
/// any state --disconnect()--> DISCONNECTING -> DISCONNECTED
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No transport and no attempt in progress.
    #[default]
    Disconnected,
    /// Acquiring credentials and opening the transport.
    Connecting,
    /// Transport is up; the upgrade exchange is in progress.
    Handshaking,
    /// Upgrade complete; traffic flows.
    Connected,
    /// The last attempt or session failed. `connect()` may be called again.
    Error,
    /// Teardown requested by the caller.
    Disconnecting,
}

impl ConnectionStatus {
    /// `connect()` is a no-op in these states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Handshaking | Self::Connected)
    }

    /// Wire/log name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Handshaking => "HANDSHAKING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
            Self::Disconnecting => "DISCONNECTING",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
