//! # realtime-cache
//!
//! Redis plumbing that lets several router instances share room and broadcast fan-out.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Relay channels**: Naming scheme for room, direct and broadcast relay channels
//! - **Pub/Sub**: Publisher and reconnecting subscriber for relay packets
//!
//! ## Example
//!
//! ```ignore
//! use realtime_cache::{Publisher, RedisPool, RedisPoolConfig, RelayChannel, RelayPacket};
//!
//! let pool = RedisPool::new(&RedisPoolConfig::default())?;
//! let publisher = Publisher::new(pool, "realtime:ws");
//!
//! let packet = RelayPacket::new("instance-a", "action", serde_json::json!({"type": "ping"}));
//! publisher.publish(&RelayChannel::room("lobby"), &packet).await?;
//! ```

pub mod pool;
pub mod pubsub;

// Re-export pool types
pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError, RedisResult};

// Re-export pubsub types
pub use pubsub::{
    Publisher, ReceivedMessage, RelayChannel, RelayPacket, Subscriber, SubscriberBuilder,
    SubscriberConfig, SubscriberError, SubscriberResult,
};
