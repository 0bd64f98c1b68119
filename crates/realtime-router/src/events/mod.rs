//! Server-originated events

mod envelope;

pub use envelope::{EventEnvelope, Target};
