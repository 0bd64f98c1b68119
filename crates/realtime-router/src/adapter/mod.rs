//! Pub/sub adapters
//!
//! An adapter widens fan-out across router instances. Without one every emit reaches
//! only the connections of the local process.

mod redis;

pub use self::redis::RedisAdapter;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Who a fan-out is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Connection(String),
    Room(String),
    All,
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(id) => write!(f, "connection {id}"),
            Self::Room(room) => write!(f, "room {room}"),
            Self::All => f.write_str("all connections"),
        }
    }
}

/// Adapter failures
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Could not subscribe to room {room}: {reason}")]
    Subscribe { room: String, reason: String },

    #[error("Could not unsubscribe from room {room}: {reason}")]
    Unsubscribe { room: String, reason: String },

    #[error("Could not publish to {recipient}: {reason}")]
    Publish { recipient: Recipient, reason: String },
}

/// Event published by another router instance
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub recipient: Recipient,
    /// Socket event to deliver on
    pub event: String,
    pub data: Value,
}

/// Cross-instance fan-out
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Start receiving packets for `room`; called when its first local member joins
    async fn subscribe(&self, room: &str) -> Result<(), AdapterError>;

    /// Stop receiving packets for `room`; called when its last local member leaves
    async fn unsubscribe(&self, room: &str) -> Result<(), AdapterError>;

    /// Hand an already locally delivered event to the other instances
    async fn publish(
        &self,
        recipient: &Recipient,
        event: &str,
        data: &Value,
    ) -> Result<(), AdapterError>;

    /// Packets from other instances, if this adapter receives any
    fn inbound(&self) -> Option<broadcast::Receiver<InboundPacket>> {
        None
    }
}
