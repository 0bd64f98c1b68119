//! Reserved names
//!
//! Lifecycle and room actions live in their own namespace (`ws#...`) so clients can never
//! invoke them through the multiplexed action channel.

/// Client channel for joining a room
pub const ROOM_JOIN_EVENT: &str = "room.join";
/// Client channel for leaving a room
pub const ROOM_LEAVE_EVENT: &str = "room.leave";
/// Client channel for leaving every joined room
pub const ROOM_CLEAR_EVENT: &str = "room.clear";
/// Socket event server-originated envelopes are sent on unless overridden
pub const DEFAULT_SOCKET_EVENT: &str = "action";

/// Actions only reachable through their dedicated flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedAction {
    Connect,
    Disconnect,
    Error,
    RoomJoin,
    RoomLeave,
    RoomClear,
}

impl ReservedAction {
    pub const ALL: [Self; 6] = [
        Self::Connect,
        Self::Disconnect,
        Self::Error,
        Self::RoomJoin,
        Self::RoomLeave,
        Self::RoomClear,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "ws#socket.connect",
            Self::Disconnect => "ws#socket.disconnect",
            Self::Error => "ws#socket.error",
            Self::RoomJoin => "ws#room.join",
            Self::RoomLeave => "ws#room.leave",
            Self::RoomClear => "ws#room.clear",
        }
    }

    /// Match a registered name against the reserved table.
    ///
    /// The part before the first `:` or `/` decides; anything after a `:` is returned
    /// as the suffix (used for room patterns such as `ws#room.join:chat/:id`).
    #[must_use]
    pub fn parse(name: &str) -> Option<(Self, Option<&str>)> {
        let end = name.find([':', '/']).unwrap_or(name.len());
        let (base, rest) = name.split_at(end);
        let reserved = Self::ALL.into_iter().find(|r| r.name() == base)?;

        let suffix = rest.strip_prefix(':').filter(|s| !s.is_empty());
        Some((reserved, suffix))
    }

    /// Whether this action may bind a room pattern
    #[must_use]
    pub fn is_room_membership(self) -> bool {
        matches!(self, Self::RoomJoin | Self::RoomLeave)
    }
}

impl std::fmt::Display for ReservedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact() {
        assert_eq!(
            ReservedAction::parse("ws#socket.connect"),
            Some((ReservedAction::Connect, None))
        );
        assert_eq!(
            ReservedAction::parse("ws#room.clear"),
            Some((ReservedAction::RoomClear, None))
        );
    }

    #[test]
    fn test_parse_with_pattern_suffix() {
        assert_eq!(
            ReservedAction::parse("ws#room.join:chat/:id"),
            Some((ReservedAction::RoomJoin, Some("chat/:id")))
        );
        assert_eq!(
            ReservedAction::parse("ws#room.leave/anything"),
            Some((ReservedAction::RoomLeave, None))
        );
    }

    #[test]
    fn test_parse_rejects_regular_names() {
        assert_eq!(ReservedAction::parse("chat.send"), None);
        assert_eq!(ReservedAction::parse("ws#room.joinx"), None);
        assert_eq!(ReservedAction::parse(""), None);
    }
}
