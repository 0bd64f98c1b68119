//! Inbound requests
//!
//! A `Request` lives from the moment a frame is stamped until its reply is written.

use super::RequestStamp;
use crate::action::ActionDescriptor;
use crate::connection::Connection;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One correlated unit of work
#[derive(Debug)]
pub struct Request {
    pub stamp: RequestStamp,
    /// Connection the request came from
    pub connection: Arc<Connection>,
    /// Resolved action, set once known
    pub action: Option<Arc<ActionDescriptor>>,
    /// Alias or room name shown in logs
    pub alias: Option<String>,
    /// Always a JSON object
    pub payload: Value,
    /// Fields handed to the intent and removed from the request
    pub extras: Map<String, Value>,
    /// Acknowledgement id to reply to
    pub ack: Option<u64>,
}

impl Request {
    /// Create a request. Anything but an object payload becomes `{}`.
    pub fn new(stamp: RequestStamp, connection: Arc<Connection>, payload: Option<Value>) -> Self {
        let payload = match payload {
            Some(value @ Value::Object(_)) => value,
            _ => Value::Object(Map::new()),
        };

        Self {
            stamp,
            connection,
            action: None,
            alias: None,
            payload,
            extras: Map::new(),
            ack: None,
        }
    }

    #[must_use]
    pub fn with_ack(mut self, ack: Option<u64>) -> Self {
        self.ack = ack;
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.stamp.id
    }

    /// Name of the resolved action, empty when unresolved
    pub fn action_name(&self) -> &str {
        self.action.as_ref().map_or("", |a| a.name())
    }

    /// Whether timing lines are written for this request
    pub fn is_debug(&self) -> bool {
        self.action.as_ref().is_none_or(|a| a.is_debug())
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extras.insert(key.into(), value);
    }

    pub(crate) fn take_extras(&mut self) -> Map<String, Value> {
        std::mem::take(&mut self.extras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RequestCorrelator;
    use axum::http::HeaderMap;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn request(payload: Option<Value>) -> Request {
        let (tx, _rx) = mpsc::channel(1);
        let connection = Connection::new("c1", HeaderMap::new(), None, tx);
        Request::new(RequestCorrelator::new().next(), connection, payload)
    }

    #[test]
    fn test_payload_normalized() {
        assert_eq!(request(None).payload, json!({}));
        assert_eq!(request(Some(json!("text"))).payload, json!({}));
        assert_eq!(request(Some(json!({"a": 1}))).payload, json!({"a": 1}));
    }

    #[test]
    fn test_extras_are_moved_out() {
        let mut req = request(None);
        req.set_extra("room", json!("lobby"));

        let extras = req.take_extras();
        assert_eq!(extras.get("room"), Some(&json!("lobby")));
        assert!(req.extras.is_empty());
    }

    #[test]
    fn test_unresolved_request_logs() {
        let req = request(None);
        assert_eq!(req.action_name(), "");
        assert!(req.is_debug());
    }
}
