//! Tracing and logging setup
//!
//! Builds the process subscriber from the router configuration. Request timing lines
//! (`[START ...]`, `[ENDED ...]`) are emitted at trace level by the router crate, so they
//! only show when the filter lets `realtime_router` through at that level.

use crate::config::{Environment, RouterConfig};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Target the router's timing lines are logged under
const TIMING_TARGET: &str = "realtime_router";

/// Tracing configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Base level when `RUST_LOG` is not set
    pub level: Level,
    /// One JSON object per line
    pub json: bool,
    /// Let request timing lines through
    pub timing: bool,
    /// Include file and line numbers
    pub file_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            timing: false,
            file_line: true,
        }
    }
}

impl TracingConfig {
    /// Preset for a deployment environment. Production logs JSON and never shows timing.
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Production => Self {
                json: true,
                file_line: false,
                ..Self::default()
            },
            Environment::Staging => Self::default(),
            Environment::Development => Self {
                level: Level::DEBUG,
                ..Self::default()
            },
        }
    }

    /// Preset for a router: the environment preset plus timing lines when `WS_DEBUG` is on
    #[must_use]
    pub fn for_router(config: &RouterConfig) -> Self {
        let mut tracing = Self::for_environment(config.app.env);
        tracing.timing = config.ws.debug && !config.app.env.is_production();
        tracing
    }

    /// Filter directives used when `RUST_LOG` is not set
    #[must_use]
    pub fn directives(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        if self.timing {
            format!("{level},{TIMING_TARGET}=trace")
        } else {
            level
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_file(self.file_line)
            .with_line_number(self.file_line)
            .with_target(!self.json);

        if self.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }
}

/// Initialize tracing with the default configuration
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Initialize tracing. `RUST_LOG` replaces the configured directives when set.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .map_err(|e| TracingError::Filter(e.to_string()))?;

    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(env_filter)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("Invalid log filter: {0}")]
    Filter(String),
}
