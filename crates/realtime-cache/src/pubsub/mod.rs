//! Redis Pub/Sub module.
//!
//! Relays fan-out packets between router instances.

mod channels;
mod publisher;
mod subscriber;

pub use channels::RelayChannel;
pub use publisher::{Publisher, RelayPacket};
pub use subscriber::{
    ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberConfig, SubscriberError,
    SubscriberResult,
};
