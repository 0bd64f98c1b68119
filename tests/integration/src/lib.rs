//! Integration test utilities for the realtime router
//!
//! This crate provides helpers for running end-to-end tests against a router served on a
//! real WebSocket listener.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
