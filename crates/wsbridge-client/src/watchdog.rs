//! Ping/pong liveness monitoring for an established connection.
//!
//! The watchdog is a pure state machine driven by the session loop: the loop
//! sleeps until [`Watchdog::next_deadline`], then calls [`Watchdog::poll`]
//! and acts on the returned [`WatchdogAction`]. A fresh watchdog is created
//! for every session, so nothing survives a reconnect.

use std::time::Duration;

use tokio::time::Instant;

/// What the session loop must do after a poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Send one ping frame; the pong timer is now armed.
    SendPing,
    /// The armed ping went unanswered.
    TimedOut,
}

/// The single outstanding ping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingPing {
    /// When the ping was sent.
    pub sent_at: Instant,
    /// When it expires without a pong.
    pub deadline: Instant,
}

/// Idle/pong timer pair for one session.
#[derive(Debug)]
pub struct Watchdog {
    idle_timeout: Duration,
    pong_timeout: Duration,
    last_inbound: Instant,
    pending: Option<PendingPing>,
}

impl Watchdog {
    /// Armed watchdog; the idle measurement starts at `now`.
    pub fn new(idle_timeout: Duration, pong_timeout: Duration, now: Instant) -> Self {
        Self {
            idle_timeout,
            pong_timeout,
            last_inbound: now,
            pending: None,
        }
    }

    /// Any inbound frame restarts the idle measurement.
    ///
    /// An outstanding ping stays armed until its pong arrives.
    pub fn record_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
    }

    /// A pong cancels the pong timer and restarts the idle measurement.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_inbound = now;
        self.pending = None;
    }

    /// The outstanding ping, if any.
    pub fn pending_ping(&self) -> Option<&PendingPing> {
        self.pending.as_ref()
    }

    /// Next instant at which [`Self::poll`] may act.
    pub fn next_deadline(&self) -> Instant {
        match &self.pending {
            Some(ping) => ping.deadline,
            None => self.last_inbound + self.idle_timeout,
        }
    }

    /// Advance to `now`.
    ///
    /// Never arms a second ping while one is outstanding.
    pub fn poll(&mut self, now: Instant) -> Option<WatchdogAction> {
        if let Some(ping) = &self.pending {
            return (now >= ping.deadline).then_some(WatchdogAction::TimedOut);
        }
        if now >= self.last_inbound + self.idle_timeout {
            self.pending = Some(PendingPing {
                sent_at: now,
                deadline: now + self.pong_timeout,
            });
            return Some(WatchdogAction::SendPing);
        }
        None
    }
}
