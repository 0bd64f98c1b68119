//! Actions
//!
//! Descriptors, room patterns and the registry that resolves names to descriptors.

mod descriptor;
mod pattern;
mod registry;

pub use descriptor::ActionDescriptor;
pub use pattern::{PatternError, RoomParams, RoomPattern};
pub use registry::ActionRegistry;
