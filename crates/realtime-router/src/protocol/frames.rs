//! Socket frames
//!
//! Client frames name a channel, carry positional arguments and optionally an ack id.
//! Server frames are either events or acknowledgements for a client frame.

use crate::error::ErrorResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent by a client
///
/// ```json
/// {"event": "dispatch", "args": [{"type": "chat.send", "payload": {}}], "ack": 7}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Channel name (`dispatch`, an alias, or one of the `room.*` channels)
    pub event: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
    /// Acknowledgement id; a frame without one never gets a reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl ClientFrame {
    #[must_use]
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
            ack: None,
        }
    }

    #[must_use]
    pub fn with_ack(mut self, ack: u64) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Positional argument, `None` when absent or JSON null
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index).filter(|v| !v.is_null())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frame sent by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Server-originated event
    Event { event: String, data: Value },
    /// Reply to the client frame carrying the same ack id
    Ack {
        ack: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorResponse>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
}

impl ServerFrame {
    #[must_use]
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
        }
    }

    #[must_use]
    pub fn ack_ok(ack: u64, result: Value) -> Self {
        Self::Ack {
            ack,
            error: None,
            result: Some(result),
        }
    }

    #[must_use]
    pub fn ack_err(ack: u64, error: ErrorResponse) -> Self {
        Self::Ack {
            ack,
            error: Some(error),
            result: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
