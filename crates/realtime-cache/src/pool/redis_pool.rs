//! Pooled Redis connections for relay publishing.
//!
//! Only publishes go through the pool. The relay subscriber keeps one dedicated pub/sub
//! connection of its own.

use std::time::Duration;

use deadpool_redis::{Config, Connection, Pool, Runtime};
use realtime_common::AdapterConfig;

/// How long a publish waits for a free connection
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for the publish pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisPoolConfig {
    /// Connection URL, credentials included
    pub url: String,
    /// Upper bound on open connections
    pub max_connections: usize,
    /// Checkout wait before a publish gives up, `None` waits forever
    pub checkout_timeout: Option<Duration>,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 8,
            checkout_timeout: Some(CHECKOUT_TIMEOUT),
        }
    }
}

impl RedisPoolConfig {
    /// Pool settings for the adapter section. `None` when no Redis URL is set.
    #[must_use]
    pub fn from_adapter(adapter: &AdapterConfig) -> Option<Self> {
        let url = adapter.redis_url.clone()?;
        Some(Self {
            url,
            max_connections: adapter.max_connections as usize,
            ..Self::default()
        })
    }

    /// The URL without its user info, safe to log
    #[must_use]
    pub fn redacted_url(&self) -> String {
        let (scheme, rest) = self.url.split_once("://").unwrap_or(("", &self.url));
        let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
        if scheme.is_empty() {
            host.to_string()
        } else {
            format!("{scheme}://{host}")
        }
    }
}

/// Publish pool failures
#[derive(Debug, thiserror::Error)]
pub enum RedisPoolError {
    #[error("Invalid Redis pool settings: {0}")]
    Build(String),

    #[error("No Redis connection available: {0}")]
    Checkout(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("Could not encode relay packet: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type RedisResult<T> = Result<T, RedisPoolError>;

/// Cloneable handle on the publish pool
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool,
}

impl RedisPool {
    /// Build the pool. No connection is opened until the first checkout.
    pub fn new(config: &RedisPoolConfig) -> RedisResult<Self> {
        let inner = Config::from_url(config.url.as_str())
            .builder()
            .map(|builder| {
                builder
                    .max_size(config.max_connections)
                    .wait_timeout(config.checkout_timeout)
                    .runtime(Runtime::Tokio1)
            })
            .map_err(|e| RedisPoolError::Build(e.to_string()))?
            .build()
            .map_err(|e| RedisPoolError::Build(e.to_string()))?;

        tracing::debug!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Relay publish pool built"
        );

        Ok(Self { inner })
    }

    /// Check out a connection
    pub async fn get(&self) -> RedisResult<Connection> {
        Ok(self.inner.get().await?)
    }

    /// Round-trip a `PING`. Used once at startup to decide whether Redis is usable.
    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Connections currently open
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner.status().size
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.inner.status();
        f.debug_struct("RedisPool")
            .field("open", &status.size)
            .field("idle", &status.available)
            .field("max", &status.max_size)
            .finish()
    }
}
