//! Intents handed to the dispatch engine
//!
//! An intent may read and mutate the connection it came from through the helpers below;
//! the connection never tracks its intents.

use crate::action::RoomParams;
use crate::auth::Credential;
use crate::connection::{Connection, ConnectionManager, MembershipError};
use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client details derived from the handshake
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub headers: HeaderMap,
}

impl ClientInfo {
    /// Forwarded-for is only honored when the proxy in front is trusted
    pub fn resolve(headers: &HeaderMap, peer_addr: Option<SocketAddr>, trust_proxy: bool) -> Self {
        let forwarded = trust_proxy
            .then(|| headers.get(FORWARDED_FOR)?.to_str().ok())
            .flatten()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        Self {
            ip: forwarded.or_else(|| peer_addr.map(|addr| addr.ip().to_string())),
            headers: headers.clone(),
        }
    }
}

/// A request as seen by an action handler
pub struct Intent {
    id: u64,
    action: String,
    alias: Option<String>,
    payload: Value,
    authorization: Option<Credential>,
    client: ClientInfo,
    connection: Arc<Connection>,
    connections: Arc<ConnectionManager>,
    extras: Map<String, Value>,
}

impl Intent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        action: String,
        alias: Option<String>,
        payload: Value,
        client: ClientInfo,
        connection: Arc<Connection>,
        connections: Arc<ConnectionManager>,
        extras: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            action,
            alias,
            payload,
            authorization: connection.authorization(),
            client,
            connection,
            connections,
            extras,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Engine key of the action (the descriptor name)
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Credential resolved at handshake, reported with kind `TOKEN`
    pub fn authorization(&self) -> Option<&Credential> {
        self.authorization.as_ref()
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn connection_id(&self) -> &str {
        self.connection.id()
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Room a join/leave request targets
    pub fn room(&self) -> Option<&str> {
        self.extras.get("room").and_then(Value::as_str)
    }

    /// Parameters captured by a room pattern
    pub fn params(&self) -> RoomParams {
        self.extras
            .get("params")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subscribe the connection to `room` right away. A no-op when already a member.
    ///
    /// Fails with [`MembershipError::Closed`] once the connection has disconnected.
    pub async fn join_room(&self, room: &str) -> Result<(), MembershipError> {
        self.connections
            .join_room(&self.connection, room)
            .await
            .map(|_| ())
    }

    /// Unsubscribe the connection from `room`. A no-op when not a member.
    pub async fn leave_room(&self, room: &str) -> Result<(), MembershipError> {
        self.connections
            .leave_room(&self.connection, room)
            .await
            .map(|_| ())
    }

    pub fn data(&self) -> Option<Map<String, Value>> {
        self.connection.data()
    }

    pub fn data_value(&self, key: &str) -> Option<Value> {
        self.connection.data_value(key)
    }

    pub fn set_data(&self, key: impl Into<String>, value: Value) -> bool {
        self.connection.set_data(key, value)
    }

    pub fn replace_data(&self, data: Map<String, Value>) -> bool {
        self.connection.replace_data(data)
    }

    pub fn clear_data(&self) {
        self.connection.clear_data();
    }

    pub fn connection_time(&self) -> Duration {
        self.connection.connection_time()
    }
}

impl std::fmt::Debug for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intent")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("alias", &self.alias)
            .field("connection_id", &self.connection.id())
            .field("client_ip", &self.client.ip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.20:51000".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_ignored_without_trust() {
        let client = ClientInfo::resolve(&headers(), peer(), false);
        assert_eq!(client.ip.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let client = ClientInfo::resolve(&headers(), peer(), true);
        assert_eq!(client.ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_trusted_proxy_without_header() {
        let client = ClientInfo::resolve(&HeaderMap::new(), peer(), true);
        assert_eq!(client.ip.as_deref(), Some("192.168.1.20"));

        let client = ClientInfo::resolve(&HeaderMap::new(), None, true);
        assert!(client.ip.is_none());
    }
}
