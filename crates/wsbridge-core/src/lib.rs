//! # wsbridge-core
//!
//! Shared vocabulary for the wsbridge WebSocket client engine.
//!
//! - [`EndpointDescriptor`] describes one physical WebSocket endpoint: its URI,
//!   static headers, optional credentials and keepalive flag.
//! - [`Headers`] is a case-insensitive, multi-valued header map with replace
//!   semantics for overrides.
//! - [`Subscription`] is one post-connect action (a message send or an HTTP call).
//! - [`LinkRef`] scopes connected tasks and message consumers to a protocol
//!   configuration or to one attribute linked through it.
//! - [`ConnectionStatus`] is the externally visible connection state.

#![deny(unsafe_code)]

pub mod endpoint;
pub mod headers;
pub mod ids;
pub mod logging;
pub mod matching;
pub mod status;
pub mod subscription;

pub use endpoint::{BasicCredential, ConfigError, EndpointDescriptor, OAuthGrant, ResolvedEndpoint, Scheme};
pub use headers::Headers;
pub use ids::{LinkRef, ProtocolId};
pub use matching::MessageMatch;
pub use status::ConnectionStatus;
pub use subscription::{HttpMethod, HttpSubscription, Subscription};
