//! Reconnect supervision.
//!
//! Clients never retry on their own. The supervisor watches each client's
//! status and, when it lands in `ERROR` with a retryable cause, calls
//! `connect()` again after an exponential backoff with jitter. Permanent
//! failures are logged and left alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wsbridge_client::WsClient;
use wsbridge_core::ConnectionStatus;
use wsbridge_settings::ReconnectSettings;

/// Backoff parameters.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap before jitter.
    pub max: Duration,
    /// Fraction of the delay randomized in either direction.
    pub jitter_factor: f64,
}

impl From<&ReconnectSettings> for Backoff {
    fn from(s: &ReconnectSettings) -> Self {
        Self {
            initial: Duration::from_millis(s.initial_delay_ms),
            max: Duration::from_millis(s.max_delay_ms),
            jitter_factor: s.jitter_factor,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based): `initial * 2^attempt`,
    /// capped at `max`, then randomized by `±jitter_factor`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as f64 * 2f64.powi(i32::try_from(attempt.min(30)).unwrap_or(30));
        let capped = base.min(self.max.as_millis() as f64);

        let spread = capped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if spread > 0.0 {
            rand::rng().random_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Install a reconnect observer on `client`. Retries stop once `stop` is
/// cancelled.
pub fn supervise(client: &WsClient, backoff: Backoff, stop: CancellationToken) {
    let attempts = Arc::new(AtomicU32::new(0));
    let handle = Handle::current();
    let this = client.clone();

    client.on_status_change(move |status| match status {
        ConnectionStatus::Connected => attempts.store(0, Ordering::Relaxed),
        ConnectionStatus::Error => {
            let Some(err) = this.last_error() else { return };
            if !err.is_retryable() {
                warn!(endpoint = %this.uri(), error = %err, "permanent failure, not reconnecting");
                return;
            }
            if stop.is_cancelled() || this.is_released() {
                return;
            }

            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            let delay = backoff.delay(attempt);
            info!(endpoint = %this.uri(), attempt = attempt + 1, ?delay, "reconnect scheduled");

            let client = this.clone();
            let stop = stop.clone();
            drop(handle.spawn(async move {
                tokio::select! {
                    () = stop.cancelled() => {}
                    () = tokio::time::sleep(delay) => {
                        if client.status() == ConnectionStatus::Error {
                            client.connect();
                        }
                    }
                }
            }));
        }
        _ => {}
    });
}
