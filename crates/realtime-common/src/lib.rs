//! # realtime-common
//!
//! Shared utilities for the realtime router: configuration, telemetry, and token verification.

pub mod auth;
pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Claims, TokenError, TokenVerifier};
pub use config::{
    AdapterConfig, AppSettings, AuthConfig, ConfigError, Environment, RouterConfig, ServerConfig,
    WsConfig,
};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
