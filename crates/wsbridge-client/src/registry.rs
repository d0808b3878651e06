//! Per-endpoint link registry: connected tasks, message consumers and
//! status observers behind a single lock.
//!
//! Consumers and observers are stored as copy-on-write lists. Fan-out clones
//! the current `Arc` under the lock and iterates outside it, so registration
//! and removal never race with an in-progress dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use wsbridge_core::{ConnectionStatus, LinkRef};

use crate::tasks::ConnectedTask;

/// A decoded inbound data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    /// Text frame.
    Text(String),
    /// Binary frame, passed through untouched.
    Binary(Bytes),
}

impl InboundMessage {
    /// Text payload, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

/// Receives every inbound message for an endpoint.
pub type MessageConsumer = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Receives every status transition, synchronously and in registration order.
pub type StatusObserver = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// A registered task plus the token cancelled when it is unregistered or
/// replaced.
#[derive(Clone)]
pub(crate) struct TaskEntry {
    pub link: LinkRef,
    pub task: Arc<dyn ConnectedTask>,
    pub registration: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    tasks: Vec<TaskEntry>,
    consumers: Arc<Vec<(LinkRef, MessageConsumer)>>,
    observers: Arc<Vec<StatusObserver>>,
}

/// All per-endpoint registries.
#[derive(Default)]
pub(crate) struct LinkRegistry {
    state: Mutex<RegistryState>,
}

impl LinkRegistry {
    /// Register `task` for `link`, replacing (in place) and cancelling any
    /// previous task for the same link.
    pub fn insert_task(&self, link: LinkRef, task: Arc<dyn ConnectedTask>) -> TaskEntry {
        let entry = TaskEntry {
            link,
            task,
            registration: CancellationToken::new(),
        };
        let mut state = self.state.lock();
        match state.tasks.iter_mut().find(|e| e.link == entry.link) {
            Some(existing) => {
                existing.registration.cancel();
                *existing = entry.clone();
            }
            None => state.tasks.push(entry.clone()),
        }
        entry
    }

    /// Unregister the task for `link`, cancelling any pending run.
    pub fn remove_task(&self, link: &LinkRef) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.tasks.iter().position(|e| &e.link == link) else {
            return false;
        };
        let entry = state.tasks.remove(pos);
        entry.registration.cancel();
        true
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> Vec<TaskEntry> {
        self.state.lock().tasks.clone()
    }

    /// Whether a task is registered for `link`.
    #[cfg(test)]
    pub fn has_task(&self, link: &LinkRef) -> bool {
        self.state.lock().tasks.iter().any(|e| &e.link == link)
    }

    pub fn add_consumer(&self, link: LinkRef, consumer: MessageConsumer) {
        let mut state = self.state.lock();
        let mut next = Vec::clone(&state.consumers);
        next.push((link, consumer));
        state.consumers = Arc::new(next);
    }

    /// Remove every consumer registered under `link`.
    pub fn remove_consumers(&self, link: &LinkRef) -> usize {
        let mut state = self.state.lock();
        let before = state.consumers.len();
        let next: Vec<_> = state
            .consumers
            .iter()
            .filter(|(l, _)| l != link)
            .cloned()
            .collect();
        let removed = before - next.len();
        state.consumers = Arc::new(next);
        removed
    }

    pub fn consumers(&self) -> Arc<Vec<(LinkRef, MessageConsumer)>> {
        Arc::clone(&self.state.lock().consumers)
    }

    pub fn add_observer(&self, observer: StatusObserver) {
        let mut state = self.state.lock();
        let mut next = Vec::clone(&state.observers);
        next.push(observer);
        state.observers = Arc::new(next);
    }

    pub fn observers(&self) -> Arc<Vec<StatusObserver>> {
        Arc::clone(&self.state.lock().observers)
    }

    /// Drop every task and consumer, cancelling pending task runs.
    pub fn clear_links(&self) {
        let mut state = self.state.lock();
        for entry in state.tasks.drain(..) {
            entry.registration.cancel();
        }
        state.consumers = Arc::new(Vec::new());
    }
}

/// Deliver `message` to every consumer in registration order.
///
/// A panicking consumer is logged and skipped. Returns how many consumers
/// were called.
pub(crate) fn fan_out(
    consumers: &[(LinkRef, MessageConsumer)],
    message: &InboundMessage,
    endpoint: &str,
) -> usize {
    for (link, consumer) in consumers {
        if catch_unwind(AssertUnwindSafe(|| consumer(message))).is_err() {
            tracing::error!(endpoint, %link, "message consumer panicked");
        }
    }
    consumers.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
