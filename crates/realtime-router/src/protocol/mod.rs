//! Wire protocol
//!
//! JSON frames exchanged over the socket and the reserved action/event names.

mod frames;
mod names;

pub use frames::{ClientFrame, ServerFrame};
pub use names::{
    ReservedAction, DEFAULT_SOCKET_EVENT, ROOM_CLEAR_EVENT, ROOM_JOIN_EVENT, ROOM_LEAVE_EVENT,
};
