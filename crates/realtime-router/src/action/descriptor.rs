//! Action descriptors
//!
//! Metadata the router keeps about a registered action. The handler code itself lives
//! in the dispatch engine, keyed by the descriptor name.

use super::pattern::{PatternError, RoomPattern};
use crate::protocol::ReservedAction;

/// A registered action
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    name: String,
    aliases: Vec<String>,
    debug: bool,
    room_pattern: Option<RoomPattern>,
}

impl ActionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            debug: true,
            room_pattern: None,
        }
    }

    /// Add an alternate client channel routed to this action
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Turn off the per-request timing lines for this action
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.debug = false;
        self
    }

    /// Bind a room pattern, making this a room-class action.
    ///
    /// The pattern becomes part of the name (`ws#room.join:chat/:id`), which is also the
    /// key the dispatch engine looks the handler up by.
    pub fn room(mut self, pattern: &str) -> Result<Self, PatternError> {
        let compiled = RoomPattern::parse(pattern)?;
        if let Some((reserved, None)) = ReservedAction::parse(&self.name) {
            self.name = format!("{reserved}:{pattern}");
        }
        self.room_pattern = Some(compiled);
        Ok(self)
    }

    pub(crate) fn with_pattern(mut self, pattern: RoomPattern) -> Self {
        self.room_pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn room_pattern(&self) -> Option<&RoomPattern> {
        self.room_pattern.as_ref()
    }

    #[must_use]
    pub fn is_room_class(&self) -> bool {
        self.room_pattern.is_some()
    }

    /// Reserved action this descriptor is registered under, if any
    #[must_use]
    pub fn reserved(&self) -> Option<ReservedAction> {
        ReservedAction::parse(&self.name).map(|(reserved, _)| reserved)
    }
}
