//! Relay channel definitions.
//!
//! Every channel name lives under a namespace so several deployments can share one Redis:
//! `{namespace}#room:{name}`, `{namespace}#direct` and `{namespace}#broadcast`.

const ROOM_MARKER: &str = "#room:";
const DIRECT_SUFFIX: &str = "#direct";
const BROADCAST_SUFFIX: &str = "#broadcast";

/// Relay channel types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelayChannel {
    /// Members of a room, on any instance
    Room(String),
    /// Packets addressed to a single connection id carried inside the packet
    Direct,
    /// Every connection on every instance
    Broadcast,
}

impl RelayChannel {
    #[must_use]
    pub fn room(name: impl Into<String>) -> Self {
        Self::Room(name.into())
    }

    /// Get the Redis channel name within `namespace`
    #[must_use]
    pub fn name(&self, namespace: &str) -> String {
        match self {
            Self::Room(room) => format!("{namespace}{ROOM_MARKER}{room}"),
            Self::Direct => format!("{namespace}{DIRECT_SUFFIX}"),
            Self::Broadcast => format!("{namespace}{BROADCAST_SUFFIX}"),
        }
    }

    /// Parse a Redis channel name back, `None` if it belongs to another namespace
    #[must_use]
    pub fn parse(namespace: &str, name: &str) -> Option<Self> {
        let rest = name.strip_prefix(namespace)?;

        if let Some(room) = rest.strip_prefix(ROOM_MARKER) {
            return Some(Self::Room(room.to_string()));
        }

        match rest {
            DIRECT_SUFFIX => Some(Self::Direct),
            BROADCAST_SUFFIX => Some(Self::Broadcast),
            _ => None,
        }
    }
}
