//! Event envelopes
//!
//! Description of one server-originated event: what to send and to whom.

use crate::adapter::Recipient;
use crate::protocol::DEFAULT_SOCKET_EVENT;
use serde_json::{json, Map, Value};

/// Resolved fan-out target, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Connection(&'a str),
    Rooms(&'a [String]),
    Broadcast,
}

/// Server-originated event
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Event type put in the `type` field
    name: String,
    /// Socket event the frame is sent on
    socket_event: String,
    payload: Value,
    /// Sent verbatim instead of `{type, payload}` when set
    raw: Option<Value>,
    connection: Option<String>,
    rooms: Vec<String>,
}

impl EventEnvelope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            socket_event: DEFAULT_SOCKET_EVENT.to_string(),
            payload: Value::Object(Map::new()),
            raw: None,
            connection: None,
            rooms: Vec::new(),
        }
    }

    /// Set the payload; anything but an object is ignored
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        if payload.is_object() {
            self.payload = payload;
        }
        self
    }

    /// Send `data` as-is; anything but an object is ignored
    #[must_use]
    pub fn raw(mut self, data: Value) -> Self {
        if data.is_object() {
            self.raw = Some(data);
        }
        self
    }

    /// Override the socket event (default `action`)
    #[must_use]
    pub fn socket_event(mut self, event: impl Into<String>) -> Self {
        self.socket_event = event.into();
        self
    }

    /// Address a single connection; takes precedence over rooms
    #[must_use]
    pub fn to_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection = Some(connection_id.into());
        self
    }

    #[must_use]
    pub fn to_room(mut self, room: impl Into<String>) -> Self {
        self.rooms.push(room.into());
        self
    }

    #[must_use]
    pub fn to_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms.extend(rooms.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event(&self) -> &str {
        &self.socket_event
    }

    /// Body sent to clients
    pub fn encode(&self) -> Value {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => json!({ "type": self.name, "payload": self.payload }),
        }
    }

    pub fn target(&self) -> Target<'_> {
        if let Some(id) = &self.connection {
            return Target::Connection(id);
        }
        if !self.rooms.is_empty() {
            return Target::Rooms(&self.rooms);
        }
        Target::Broadcast
    }

    /// One recipient per delivery the target expands to
    pub fn recipients(&self) -> Vec<Recipient> {
        match self.target() {
            Target::Connection(id) => vec![Recipient::Connection(id.to_string())],
            Target::Rooms(rooms) => rooms.iter().cloned().map(Recipient::Room).collect(),
            Target::Broadcast => vec![Recipient::All],
        }
    }
}
