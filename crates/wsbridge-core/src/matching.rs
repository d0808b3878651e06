//! Declarative inbound-message filters for attribute links.

use serde::{Deserialize, Serialize};

/// How a linked attribute selects the inbound messages it cares about.
///
/// Evaluated by the consumer, never by the router.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MessageMatch {
    /// Whole payload equals the value.
    Equals(String),
    /// Payload contains the value.
    Contains(String),
    /// Payload matches the regular expression.
    Regex(String),
}
