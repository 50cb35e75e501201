//! Authentication and authorization module

pub mod token;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Re-export main components
pub use token::{Claims, TokenVerifier};

/// Scopes a credential may grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Publish,
    Subscribe,
}

impl Scope {
    /// Parse a scope claim value, ignoring unrecognized entries
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "publish" => Some(Scope::Publish),
            "subscribe" => Some(Scope::Subscribe),
            _ => None,
        }
    }
}

/// Immutable record derived from a verified credential, scoping what a
/// session may do and on which channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub subject: String,
    pub authorized_channels: HashSet<String>,
    pub scopes: HashSet<Scope>,
    pub is_admin: bool,
}

impl Authorization {
    pub fn is_publisher(&self) -> bool {
        self.scopes.contains(&Scope::Publish)
    }

    pub fn is_subscriber(&self) -> bool {
        self.scopes.contains(&Scope::Subscribe)
    }

    /// An admin authorization is authorized for every channel
    pub fn is_authorized(&self, channel: &str) -> bool {
        if self.subject.is_empty() {
            return false;
        }

        if self.is_admin {
            return true;
        }

        self.authorized_channels.contains(channel)
    }
}
