//! Router configuration structs
//!
//! Loads configuration from environment variables, falling back to defaults for every
//! option so a bare process starts a local-only router on port 4000.

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main router configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub ws: WsConfig,
    pub adapter: AdapterConfig,
    pub auth: AuthConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(ConfigError::InvalidValue("APP_ENV", other.to_string())),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// WebSocket transport options
#[derive(Debug, Clone, Deserialize)]
pub struct WsConfig {
    /// Path the upgrade endpoint is mounted on
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Emit per-request timing lines
    #[serde(default = "default_true")]
    pub debug: bool,
    /// Prefer `x-forwarded-for` over the peer address
    #[serde(default)]
    pub trust_proxy: bool,
    /// Name of the multiplexed action channel
    #[serde(default = "default_action_name")]
    pub action_name: String,
}

/// Pub/sub adapter selection. No URL means local-only fan-out.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Namespace prepended to every relay channel
    #[serde(default = "default_adapter_channel")]
    pub channel: String,
    #[serde(default = "default_adapter_max_connections")]
    pub max_connections: u32,
}

/// Handshake authorization settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for JWT bearer tokens. Opaque tokens are accepted when unset.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Cookie consulted when no `Authorization` header is sent
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

// Default value functions
fn default_app_name() -> String {
    "realtime-router".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_true() -> bool {
    true
}

fn default_action_name() -> String {
    "dispatch".to_string()
}

fn default_adapter_channel() -> String {
    "realtime:ws".to_string()
}

fn default_adapter_max_connections() -> u32 {
    8
}

fn default_cookie_name() -> String {
    "token".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::default(),
            },
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            ws: WsConfig {
                path: default_ws_path(),
                debug: true,
                trust_proxy: false,
                action_name: default_action_name(),
            },
            adapter: AdapterConfig {
                redis_url: None,
                channel: default_adapter_channel(),
                max_connections: default_adapter_max_connections(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                cookie_name: default_cookie_name(),
            },
        }
    }
}

impl RouterConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is set but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: parse_var("APP_ENV", env::var("APP_ENV").ok(), Environment::default)?,
            },
            server: ServerConfig {
                host: env::var("ROUTER_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("ROUTER_PORT", env::var("ROUTER_PORT").ok(), default_port)?,
            },
            ws: WsConfig {
                path: env::var("WS_PATH").unwrap_or_else(|_| default_ws_path()),
                debug: parse_flag("WS_DEBUG", env::var("WS_DEBUG").ok(), true)?,
                trust_proxy: parse_flag("WS_TRUST_PROXY", env::var("WS_TRUST_PROXY").ok(), false)?,
                action_name: env::var("WS_ACTION_NAME").unwrap_or_else(|_| default_action_name()),
            },
            adapter: AdapterConfig {
                redis_url: env::var("WS_ADAPTER_REDIS_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
                channel: env::var("WS_ADAPTER_CHANNEL")
                    .unwrap_or_else(|_| default_adapter_channel()),
                max_connections: parse_var(
                    "WS_ADAPTER_MAX_CONNECTIONS",
                    env::var("WS_ADAPTER_MAX_CONNECTIONS").ok(),
                    default_adapter_max_connections,
                )?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("AUTH_JWT_SECRET")
                    .ok()
                    .filter(|secret| !secret.is_empty()),
                cookie_name: env::var("AUTH_COOKIE_NAME").unwrap_or_else(|_| default_cookie_name()),
            },
        })
    }
}

fn parse_var<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, value)),
        None => Ok(default()),
    }
}

fn parse_flag(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    let normalized = value.trim().to_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key, value)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
