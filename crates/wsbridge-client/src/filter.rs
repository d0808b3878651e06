//! Per-link inbound message filters.

use std::sync::Arc;

use regex::Regex;
use wsbridge_core::MessageMatch;

use crate::registry::{InboundMessage, MessageConsumer};

/// A compiled [`MessageMatch`]. Binary frames never match.
#[derive(Debug, Clone)]
pub enum MessageFilter {
    /// Whole payload equals the value.
    Equals(String),
    /// Payload contains the value.
    Contains(String),
    /// Payload matches anywhere.
    Regex(Regex),
}

impl MessageFilter {
    /// Compile a configured match rule.
    pub fn compile(rule: &MessageMatch) -> Result<Self, regex::Error> {
        Ok(match rule {
            MessageMatch::Equals(value) => Self::Equals(value.clone()),
            MessageMatch::Contains(value) => Self::Contains(value.clone()),
            MessageMatch::Regex(pattern) => Self::Regex(Regex::new(pattern)?),
        })
    }

    /// Whether a consumer behind this filter should see `message`.
    pub fn matches(&self, message: &InboundMessage) -> bool {
        let Some(text) = message.as_text() else {
            return false;
        };
        match self {
            Self::Equals(value) => text == value,
            Self::Contains(value) => text.contains(value.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }

    /// Wrap `consumer` so it only sees matching messages.
    pub fn wrap(self, consumer: MessageConsumer) -> MessageConsumer {
        Arc::new(move |message: &InboundMessage| {
            if self.matches(message) {
                consumer(message);
            }
        })
    }
}
