use std::fmt;

use ink_store::keys;
use serde::{Deserialize, Serialize};

/// Identity of the actor a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for ActorId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoticeScope {
    Broadcast,
    Actor(ActorId),
}

/// Scope without the identity, as it travels in dismiss requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    #[serde(rename = "admin")]
    Broadcast,
    #[serde(rename = "user")]
    Actor,
}

impl ScopeKind {
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Broadcast => "admin",
            Self::Actor => "user",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Broadcast),
            "user" => Some(Self::Actor),
            _ => None,
        }
    }
}

impl NoticeScope {
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Broadcast => ScopeKind::Broadcast,
            Self::Actor(_) => ScopeKind::Actor,
        }
    }

    pub(crate) fn persistent_key(&self) -> String {
        match self {
            Self::Broadcast => keys::NOTICES_BROADCAST.to_string(),
            Self::Actor(actor) => keys::notices_actor(actor.as_str()),
        }
    }

    pub(crate) fn transient_key(&self) -> String {
        match self {
            Self::Broadcast => keys::TRANSIENT_BROADCAST.to_string(),
            Self::Actor(actor) => keys::transient_actor(actor.as_str()),
        }
    }
}
