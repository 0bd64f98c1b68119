//! Event broadcasting
//!
//! Server-originated events: buffering until the router is ready, local and cross-instance
//! fan-out, and relaying packets from other instances.

mod fanout;
mod pending;
mod relay;

pub use fanout::{Fanout, FanoutError, FanoutReport};
pub use pending::PendingQueue;
pub use relay::RelayDispatcher;
