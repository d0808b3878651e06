//! # wsbridge-client
//!
//! Client engine for one outbound WebSocket connection per linked protocol
//! configuration.
//!
//! - [`WsClient`] owns the connection state machine
//!   (`DISCONNECTED -> CONNECTING -> HANDSHAKING -> CONNECTED`, `ERROR`,
//!   `DISCONNECTING`), credential acquisition before the handshake, the
//!   keepalive [`watchdog`], and fan-out of inbound messages.
//! - [`ConnectedTask`]s registered per [`LinkRef`](wsbridge_core::LinkRef) are
//!   replayed after every successful connect; [`SubscriptionTask`] replays
//!   declared [`Subscription`](wsbridge_core::Subscription)s through the
//!   [`SubscriptionExecutor`].
//! - [`ConnectionHub`] maps protocol configurations to clients and
//!   implements link/unlink.
//!
//! Reconnect policy is left to the caller: a client in `ERROR` stays there
//! until `connect()` is called again.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod errors;
pub mod filter;
pub mod handshake;
pub mod hub;
pub mod registry;
mod session;
pub mod subscriptions;
pub mod tasks;
pub mod watchdog;

pub use config::ClientConfig;
pub use connection::WsClient;
pub use errors::{ClientError, SubscriptionError};
pub use filter::MessageFilter;
pub use hub::ConnectionHub;
pub use registry::{InboundMessage, MessageConsumer, StatusObserver};
pub use subscriptions::{
    ReplayReport, ReplayTrigger, SubscriptionExecutor, SubscriptionOutcome, SubscriptionResult,
    TaskReport,
};
pub use tasks::{ConnectedTask, SubscriptionTask, TaskContext};
pub use watchdog::{Watchdog, WatchdogAction};
