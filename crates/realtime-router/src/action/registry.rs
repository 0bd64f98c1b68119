//! Action registry
//!
//! Holds the primary action table, the reserved lifecycle/room table, pattern-bound room
//! actions, aliases and the runtime disabled set. Every table is safe to read while
//! `disable`/`enable` run concurrently.

use super::descriptor::ActionDescriptor;
use super::pattern::{RoomParams, RoomPattern};
use crate::protocol::{ReservedAction, ROOM_CLEAR_EVENT, ROOM_JOIN_EVENT, ROOM_LEAVE_EVENT};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::sync::Arc;

/// Registry of actions available to clients and lifecycle flows
pub struct ActionRegistry {
    /// Client-invocable actions by name
    actions: DashMap<String, Arc<ActionDescriptor>>,

    /// Generic lifecycle and room actions
    reserved: DashMap<ReservedAction, Arc<ActionDescriptor>>,

    /// Pattern-bound join/leave actions in registration order
    room_routes: RwLock<Vec<(ReservedAction, Arc<ActionDescriptor>)>>,

    /// Alias channel to action
    aliases: DashMap<String, Arc<ActionDescriptor>>,

    /// Names currently disabled
    disabled: DashSet<String>,

    /// Client channels the router handles before looking up aliases
    channels: DashSet<String>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: DashMap::new(),
            reserved: DashMap::new(),
            room_routes: RwLock::new(Vec::new()),
            aliases: DashMap::new(),
            disabled: DashSet::new(),
            channels: [ROOM_JOIN_EVENT, ROOM_LEAVE_EVENT, ROOM_CLEAR_EVENT]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Keep `channel` from being registered as an alias
    pub fn reserve_channel(&self, channel: &str) {
        self.channels.insert(channel.to_string());
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register an action. Returns `false` when an earlier registration wins.
    pub fn add_handler(&self, descriptor: ActionDescriptor) -> bool {
        if let Some((reserved, suffix)) = ReservedAction::parse(descriptor.name()) {
            let suffix = suffix.map(str::to_string);
            return self.add_reserved(reserved, suffix.as_deref(), descriptor);
        }

        let descriptor = Arc::new(descriptor);
        match self.actions.entry(descriptor.name().to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(action = %descriptor.name(), "Duplicate action ignored");
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(descriptor.clone());
            }
        }

        for alias in descriptor.aliases() {
            self.add_alias(&descriptor, alias);
        }

        tracing::debug!(action = %descriptor.name(), "Action registered");
        true
    }

    fn add_reserved(
        &self,
        reserved: ReservedAction,
        suffix: Option<&str>,
        mut descriptor: ActionDescriptor,
    ) -> bool {
        if !descriptor.aliases().is_empty() {
            tracing::warn!(action = %descriptor.name(), "Aliases are ignored on reserved actions");
        }

        if descriptor.room_pattern().is_none() {
            if let Some(source) = suffix {
                match RoomPattern::parse(source) {
                    Ok(pattern) => descriptor = descriptor.with_pattern(pattern),
                    Err(e) => {
                        tracing::warn!(action = %descriptor.name(), error = %e, "Invalid room pattern, action ignored");
                        return false;
                    }
                }
            }
        }

        if descriptor.is_room_class() {
            if !reserved.is_room_membership() {
                tracing::warn!(action = %descriptor.name(), "Only room join/leave actions may bind a pattern");
                return false;
            }

            let mut routes = self.room_routes.write();
            if routes.iter().any(|(_, d)| d.name() == descriptor.name()) {
                tracing::warn!(action = %descriptor.name(), "Room action already registered, ignoring");
                return false;
            }
            routes.push((reserved, Arc::new(descriptor)));
            return true;
        }

        match self.reserved.entry(reserved) {
            Entry::Occupied(_) => {
                tracing::warn!(action = %reserved, "Reserved action already registered, ignoring");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(descriptor));
                true
            }
        }
    }

    /// Route `alias` to `descriptor`. Returns `false` when the alias is taken or names a
    /// channel the router routes itself.
    pub fn add_alias(&self, descriptor: &Arc<ActionDescriptor>, alias: &str) -> bool {
        if self.channels.contains(alias) {
            tracing::warn!(
                alias = %alias,
                action = %descriptor.name(),
                "Alias shadowed by a router channel, ignoring"
            );
            return false;
        }

        match self.aliases.entry(alias.to_string()) {
            Entry::Occupied(existing) => {
                tracing::warn!(
                    alias = %alias,
                    action = %descriptor.name(),
                    registered_for = %existing.get().name(),
                    "Alias already registered, ignoring"
                );
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(descriptor.clone());
                true
            }
        }
    }

    /// Add an alias to an already registered action by name
    pub fn alias_action(&self, action: &str, alias: &str) -> bool {
        match self.actions.get(action).map(|d| d.clone()) {
            Some(descriptor) => self.add_alias(&descriptor, alias),
            None => {
                tracing::warn!(action = %action, alias = %alias, "Cannot alias unknown action");
                false
            }
        }
    }

    /// Resolve any registered name, reserved names included
    pub fn resolve(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        match ReservedAction::parse(name) {
            Some((reserved, None)) => self.reserved(reserved),
            Some((_, Some(_))) => self
                .room_routes
                .read()
                .iter()
                .find(|(_, d)| d.name() == name)
                .map(|(_, d)| d.clone()),
            None => self.actions.get(name).map(|d| d.clone()),
        }
    }

    /// Resolve a `type` sent on the multiplexed channel. Reserved names never resolve.
    pub fn resolve_client(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        if ReservedAction::parse(name).is_some() {
            return None;
        }
        self.actions.get(name).map(|d| d.clone())
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<Arc<ActionDescriptor>> {
        self.aliases.get(alias).map(|d| d.clone())
    }

    pub fn reserved(&self, reserved: ReservedAction) -> Option<Arc<ActionDescriptor>> {
        self.reserved.get(&reserved).map(|d| d.clone())
    }

    /// Action handling a join/leave of `room`: the first matching pattern, else the generic one
    pub fn room_action(
        &self,
        reserved: ReservedAction,
        room: &str,
    ) -> Option<(Arc<ActionDescriptor>, RoomParams)> {
        let routed = self.room_routes.read().iter().find_map(|(kind, descriptor)| {
            if *kind != reserved {
                return None;
            }
            descriptor
                .room_pattern()
                .and_then(|pattern| pattern.matches(room))
                .map(|params| (descriptor.clone(), params))
        });

        routed.or_else(|| self.reserved(reserved).map(|d| (d, RoomParams::new())))
    }

    /// Disable an action by name; takes effect for the next dispatch
    pub fn disable(&self, name: &str) {
        if self.disabled.insert(name.to_string()) {
            tracing::info!(action = %name, "Action disabled");
        }
    }

    pub fn enable(&self, name: &str) {
        if self.disabled.remove(name).is_some() {
            tracing::info!(action = %name, "Action enabled");
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.contains(name)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.len())
            .field("reserved", &self.reserved.len())
            .field("room_routes", &self.room_routes.read().len())
            .field("aliases", &self.aliases.len())
            .field("disabled", &self.disabled.len())
            .finish()
    }
}
