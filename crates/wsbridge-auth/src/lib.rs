//! # wsbridge-auth
//!
//! Produces the `Authorization` header for an endpoint before its handshake.
//!
//! - OAuth client-credential grant: POST to the token endpoint, yields
//!   `Bearer <access_token>`.
//! - Basic credential: `Basic base64(username:password)`, computed locally.
//! - OAuth wins when both are configured.
//!
//! The resulting header replaces any statically configured `Authorization`
//! header; it is never appended.

#![deny(unsafe_code)]

pub mod errors;
pub mod provider;

pub use errors::AuthError;
pub use provider::{AuthHeader, AuthProvider, AuthScheme, basic_header};
