//! Endpoint addresses
//!
//! Addresses are never stored: they are derived from the user handle, the
//! identity token and the domain whenever needed.
//!
//! ```rust
//! use sipduet_core::address::{AgentKind, EndpointAddress};
//!
//! let alice = EndpointAddress::for_user("alice", "T0k3n", "sipjs.onsip.com");
//! assert_eq!(alice.as_str(), "alice.T0k3n@sipjs.onsip.com");
//! assert_eq!(alice.to_sip_uri(), "sip:alice.T0k3n@sipjs.onsip.com");
//!
//! let data = alice.for_kind(AgentKind::Data);
//! assert_eq!(data.as_str(), "data.alice.T0k3n@sipjs.onsip.com");
//! ```

use serde::{Deserialize, Serialize};

/// Prefix that marks a data-only identity
pub const DATA_PREFIX: &str = "data.";

/// Which flavour of endpoint an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Audio/video capable endpoint
    Media,
    /// Endpoint that never opens capture devices
    Data,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Media => write!(f, "media"),
            AgentKind::Data => write!(f, "data"),
        }
    }
}

/// A `user@domain` address on the signaling network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    /// Wrap an address, dropping a leading `sip:` scheme if present
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        match address.strip_prefix("sip:") {
            Some(rest) => Self(rest.to_string()),
            None => Self(address),
        }
    }

    /// `<handle>.<token>@<domain>`
    pub fn for_user(handle: &str, token: &str, domain: &str) -> Self {
        Self(format!("{}.{}@{}", handle, token, domain))
    }

    /// The address of the same user for the given endpoint kind
    pub fn for_kind(&self, kind: AgentKind) -> Self {
        match kind {
            AgentKind::Media => self.clone(),
            AgentKind::Data if self.is_data() => self.clone(),
            AgentKind::Data => Self(format!("{}{}", DATA_PREFIX, self.0)),
        }
    }

    pub fn is_data(&self) -> bool {
        self.0.starts_with(DATA_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before `@`
    pub fn user(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(user, _)| user)
    }

    /// Part after `@`, if any
    pub fn domain(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, domain)| domain)
    }

    /// Request URI form used when placing calls
    pub fn to_sip_uri(&self) -> String {
        format!("sip:{}", self.0)
    }
}

impl std::fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EndpointAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
