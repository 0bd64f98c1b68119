//! Server state
//!
//! Application state shared by the HTTP and WebSocket handlers.

use crate::router::Router;
use realtime_common::RouterConfig;
use std::sync::Arc;

/// Server application state
#[derive(Clone)]
pub struct RouterState {
    router: Arc<Router>,
    config: Arc<RouterConfig>,
}

impl RouterState {
    pub fn new(router: Arc<Router>, config: RouterConfig) -> Self {
        Self {
            router,
            config: Arc::new(config),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl std::fmt::Debug for RouterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterState")
            .field("router", &self.router)
            .field("config", &"RouterConfig")
            .finish()
    }
}
