//! Timings for one client.

use std::time::Duration;

/// Per-client timings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Inbound silence before a ping is sent.
    pub idle_timeout: Duration,
    /// Wait for a pong after a ping.
    pub pong_timeout: Duration,
    /// Bound on the TCP connect and, separately, on the upgrade exchange.
    pub connect_timeout: Duration,
    /// Pause after CONNECTED before replaying registered tasks.
    pub settle_delay: Duration,
    /// Pause before running a task registered while already CONNECTED.
    pub late_registration_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            late_registration_delay: Duration::from_secs(1),
        }
    }
}
