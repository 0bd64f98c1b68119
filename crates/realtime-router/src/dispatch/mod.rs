//! Request dispatch
//!
//! Correlation, the intent handed to handlers, the engine seam and the bridge between them.

mod bridge;
mod correlator;
mod engine;
mod intent;
mod request;

pub use bridge::DispatchBridge;
pub use correlator::{RequestCorrelator, RequestStamp};
pub use engine::{
    ActionError, ActionHandler, ActionResult, Completion, CompletionReceiver, DispatchEngine,
    HandlerEngine,
};
pub use intent::{ClientInfo, Intent};
pub use request::Request;
