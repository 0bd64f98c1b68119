//! Redis Pub/Sub publisher.
//!
//! Publishes relay packets so peer router instances can deliver them to their own connections.

use crate::pool::{RedisPool, RedisResult};
use crate::pubsub::RelayChannel;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// One fan-out hop between router instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPacket {
    /// Instance that published the packet; it already delivered locally
    pub origin: String,
    /// Socket event the clients receive the data on
    pub event: String,
    /// Encoded event body
    pub data: serde_json::Value,
    /// Target connection for direct packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

impl RelayPacket {
    #[must_use]
    pub fn new(origin: impl Into<String>, event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            event: event.into(),
            data,
            connection: None,
        }
    }

    /// Address the packet to one connection
    #[must_use]
    pub fn for_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection = Some(connection_id.into());
        self
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Redis Pub/Sub publisher
#[derive(Clone)]
pub struct Publisher {
    pool: RedisPool,
    namespace: String,
}

impl Publisher {
    #[must_use]
    pub fn new(pool: RedisPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Publish a packet, returning how many subscribers received it
    pub async fn publish(&self, channel: &RelayChannel, packet: &RelayPacket) -> RedisResult<u32> {
        let mut conn = self.pool.get().await?;
        let channel_name = channel.name(&self.namespace);
        let payload = packet.to_json()?;

        let receivers: u32 = conn.publish(&channel_name, &payload).await?;

        tracing::debug!(
            channel = %channel_name,
            event = %packet.event,
            receivers = receivers,
            "Published relay packet"
        );

        Ok(receivers)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("namespace", &self.namespace)
            .field("pool", &self.pool)
            .finish()
    }
}
