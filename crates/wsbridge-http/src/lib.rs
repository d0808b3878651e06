//! # wsbridge-http
//!
//! The HTTP request/response collaborator shared by the authentication
//! provider (OAuth token requests) and the subscription executor (HTTP
//! subscriptions).
//!
//! One [`ReqwestHttpClient`] is constructed explicitly by the application
//! and handed to the components that need it as an `Arc<dyn HttpClient>`.
//! It enforces its own request timeout.

#![deny(unsafe_code)]

pub mod client;
pub mod types;

pub use client::{HttpClientConfig, ReqwestHttpClient};
pub use types::{HttpClient, HttpError, HttpRequest, HttpResponse};
pub use wsbridge_core::HttpMethod;
