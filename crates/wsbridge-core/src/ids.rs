//! Identifiers for protocol configurations and the links multiplexed over them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a linked protocol configuration (one physical endpoint).
    ProtocolId
);

/// Identifies either a protocol configuration as a whole or one attribute
/// linked through it.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LinkRef {
    /// The protocol configuration itself.
    Protocol {
        /// Owning protocol configuration.
        protocol: ProtocolId,
    },
    /// A single attribute linked through the protocol configuration.
    Attribute {
        /// Owning protocol configuration.
        protocol: ProtocolId,
        /// Asset that owns the attribute.
        asset: String,
        /// Attribute name on the asset.
        attribute: String,
    },
}

impl LinkRef {
    /// Reference to a whole protocol configuration.
    pub fn protocol(protocol: impl Into<ProtocolId>) -> Self {
        Self::Protocol {
            protocol: protocol.into(),
        }
    }

    /// Reference to one attribute linked through a protocol configuration.
    pub fn attribute(
        protocol: impl Into<ProtocolId>,
        asset: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            protocol: protocol.into(),
            asset: asset.into(),
            attribute: attribute.into(),
        }
    }

    /// The protocol configuration this link belongs to.
    pub fn protocol_id(&self) -> &ProtocolId {
        match self {
            Self::Protocol { protocol } | Self::Attribute { protocol, .. } => protocol,
        }
    }

    /// Whether this reference names the protocol configuration itself.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

impl From<String> for ProtocolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol { protocol } => write!(f, "{protocol}"),
            Self::Attribute {
                protocol,
                asset,
                attribute,
            } => write!(f, "{protocol}/{asset}:{attribute}"),
        }
    }
}
