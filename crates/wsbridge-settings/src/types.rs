//! Settings schema.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsbridge_core::{EndpointDescriptor, LinkRef, MessageMatch, ProtocolId, Subscription};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsBridgeSettings {
    /// Timings and logging shared by every endpoint.
    pub client: ClientSettings,
    /// Linked protocol configurations.
    pub endpoints: Vec<EndpointSettings>,
}

impl WsBridgeSettings {
    /// Reject configurations that can never work.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate endpoint id '{}'",
                    endpoint.id
                )));
            }
        }
        Ok(())
    }
}

/// Client timings, all in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines instead of compact text.
    pub json_logs: bool,
    /// Inbound silence before a ping is sent.
    pub idle_timeout_ms: u64,
    /// Wait for a pong before declaring the connection dead.
    pub pong_timeout_ms: u64,
    /// TCP connect plus upgrade timeout.
    pub connect_timeout_ms: u64,
    /// Pause after CONNECTED before replaying protocol-level tasks.
    pub connected_settle_delay_ms: u64,
    /// Pause before running a task registered while already CONNECTED.
    pub late_registration_delay_ms: u64,
    /// Per-call timeout of the shared HTTP client.
    pub http_timeout_ms: u64,
    /// Backoff used by the binary when a connection ends in ERROR.
    pub reconnect: ReconnectSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            idle_timeout_ms: 10_000,
            pong_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            connected_settle_delay_ms: 2_000,
            late_registration_delay_ms: 1_000,
            http_timeout_ms: 30_000,
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl ClientSettings {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("idleTimeoutMs", self.idle_timeout_ms),
            ("pongTimeoutMs", self.pong_timeout_ms),
            ("connectTimeoutMs", self.connect_timeout_ms),
            ("httpTimeoutMs", self.http_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be positive")));
            }
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(SettingsError::InvalidValue(
                "reconnect.initialDelayMs exceeds reconnect.maxDelayMs".to_string(),
            ));
        }
        Ok(())
    }

    /// [`Self::idle_timeout_ms`] as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// [`Self::pong_timeout_ms`] as a duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// [`Self::connect_timeout_ms`] as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// [`Self::connected_settle_delay_ms`] as a duration.
    pub fn connected_settle_delay(&self) -> Duration {
        Duration::from_millis(self.connected_settle_delay_ms)
    }

    /// [`Self::late_registration_delay_ms`] as a duration.
    pub fn late_registration_delay(&self) -> Duration {
        Duration::from_millis(self.late_registration_delay_ms)
    }

    /// [`Self::http_timeout_ms`] as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Exponential backoff with jitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on any delay.
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in either direction.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
            jitter_factor: 0.2,
        }
    }
}

/// One linked protocol configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSettings {
    /// Unique protocol configuration id.
    pub id: ProtocolId,
    /// URI, headers, credentials and keepalive flag.
    #[serde(flatten)]
    pub endpoint: EndpointDescriptor,
    /// Protocol-level subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Attributes linked through this configuration.
    #[serde(default)]
    pub links: Vec<LinkSettings>,
}

impl EndpointSettings {
    /// Link reference of the configuration itself.
    pub fn link_ref(&self) -> LinkRef {
        LinkRef::protocol(self.id.clone())
    }
}

/// One attribute linked through an endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSettings {
    /// Asset id.
    pub asset: String,
    /// Attribute name.
    pub attribute: String,
    /// Attribute-level subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Inbound message filter for this attribute.
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub message_match: Option<MessageMatch>,
}

impl LinkSettings {
    /// Link reference under `protocol`.
    pub fn link_ref(&self, protocol: &ProtocolId) -> LinkRef {
        LinkRef::attribute(protocol.clone(), self.asset.clone(), self.attribute.clone())
    }
}
