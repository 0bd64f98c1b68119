//! # realtime-router
//!
//! Realtime event router over WebSocket connections: typed actions dispatched to a host
//! engine, per-connection room membership, and server-originated events fanned out to a
//! connection, a set of rooms or everyone.

pub mod action;
pub mod adapter;
pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod response;
pub mod rooms;
pub mod router;
pub mod server;

pub use action::{ActionDescriptor, ActionRegistry};
pub use dispatch::{ActionError, ActionHandler, DispatchEngine, HandlerEngine, Intent};
pub use error::{ErrorResponse, RouterError, RouterResult};
pub use events::EventEnvelope;
pub use router::{Router, RouterBuilder, RouterOptions};
pub use server::run;
