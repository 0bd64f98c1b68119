//! Configuration structs

mod router_config;

pub use router_config::{
    AdapterConfig, AppSettings, AuthConfig, ConfigError, Environment, RouterConfig, ServerConfig,
    WsConfig,
};
