//! Router server setup
//!
//! Binds the router to an axum WebSocket endpoint.

mod handler;
mod state;

pub use handler::ws_handler;
pub use state::RouterState;

use crate::adapter::{Adapter, RedisAdapter};
use crate::auth::{AuthorizationResolver, HeaderTokenResolver, JwtResolver};
use crate::dispatch::DispatchEngine;
use crate::router::Router as EventRouter;
use axum::{routing::get, Router};
use realtime_common::{RouterConfig, TokenVerifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Server failures
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Create the HTTP router with the WebSocket endpoint at `path`
pub fn create_router(path: &str) -> Router<RouterState> {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: RouterState) -> Router {
    let path = state.config().ws.path.clone();
    create_router(&path)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolver for the configured auth mode: JWT when a secret is set, opaque tokens otherwise
pub fn build_resolver(config: &RouterConfig) -> Arc<dyn AuthorizationResolver> {
    let headers = HeaderTokenResolver::new(&config.auth.cookie_name);
    match &config.auth.jwt_secret {
        Some(secret) => Arc::new(JwtResolver::new(headers, TokenVerifier::new(secret))),
        None => Arc::new(headers),
    }
}

/// Build the router for `config` around `engine`
pub async fn build_router(config: &RouterConfig, engine: Arc<dyn DispatchEngine>) -> Arc<EventRouter> {
    let adapter: Option<Arc<dyn Adapter>> = RedisAdapter::build(&config.adapter).await;
    if adapter.is_none() {
        tracing::info!("No pub/sub adapter, fan-out stays local");
    }

    EventRouter::builder(engine)
        .config(config)
        .resolver(build_resolver(config))
        .adapter(adapter)
        .build()
}

/// Serve `app` on `listener` until the server stops
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), ServerError> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(ServerError::Serve)
}

/// Run the router server
pub async fn run_server(app: Router, addr: &str) -> Result<(), ServerError> {
    tracing::info!("Starting router server on {}", addr);

    let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    tracing::info!("Router listening on {}", addr);
    serve(listener, app).await
}

/// Attach `router` and serve it until the server stops
pub async fn run(config: RouterConfig, router: Arc<EventRouter>) -> Result<(), ServerError> {
    let addr = config.server.address();

    router.attach().await;
    let app = create_app(RouterState::new(router.clone(), config));
    let result = run_server(app, &addr).await;

    router.shutdown();
    result
}
