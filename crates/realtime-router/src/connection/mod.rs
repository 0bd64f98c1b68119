//! Connection management
//!
//! Connection records and the manager that indexes them by id and by room.

mod connection;
mod manager;

pub use connection::Connection;
pub use manager::{ConnectionManager, MembershipError};
