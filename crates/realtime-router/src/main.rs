//! Realtime router entry point
//!
//! Run with:
//! ```bash
//! cargo run -p realtime-router
//! ```
//!
//! Configuration is loaded from environment variables.

use realtime_common::{try_init_tracing_with_config, RouterConfig, TracingConfig};
use realtime_router::dispatch::{ActionError, HandlerEngine, Intent};
use realtime_router::events::EventEnvelope;
use realtime_router::{server, ActionDescriptor, Router};
use serde_json::{json, Value};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Router failed to start");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = RouterConfig::from_env()?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_router(&config)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        address = %config.server.address(),
        path = %config.ws.path,
        "Configuration loaded"
    );

    let engine = HandlerEngine::new_shared();
    register_handlers(&engine);

    let router = server::build_router(&config, engine).await;
    register_actions(&router)?;

    let announcer = router.clone();
    tokio::spawn(async move {
        // Buffered until the server attaches the router
        let envelope = EventEnvelope::new("server.started")
            .payload(json!({ "version": env!("CARGO_PKG_VERSION") }));
        announcer.emit(envelope).await;
    });

    server::run(config, router).await?;
    Ok(())
}

fn register_actions(router: &Router) -> anyhow::Result<()> {
    router.add_handler(ActionDescriptor::new("ws#socket.connect"));
    router.add_handler(ActionDescriptor::new("ws#socket.disconnect").quiet());
    router.add_handler(ActionDescriptor::new("ws#room.join"));
    router.add_handler(ActionDescriptor::new("ws#room.leave"));
    router.add_handler(ActionDescriptor::new("ws#room.clear"));
    router.add_handler(ActionDescriptor::new("ws#room.join").room("chat/:id")?);
    router.add_handler(ActionDescriptor::new("echo"));
    router.add_handler(ActionDescriptor::new("chat.send").alias("send"));
    Ok(())
}

fn register_handlers(engine: &HandlerEngine) {
    engine.register_fn("ws#socket.connect", |intent: Intent| async move {
        match intent.authorization() {
            Some(_) => Ok(Value::Null),
            None => Err(
                ActionError::new("TRANSPORT.AUTH_REQUIRED", "Authorization is required")
                    .with_status(401),
            ),
        }
    });

    engine.register_fn("ws#socket.disconnect", |intent: Intent| async move {
        info!(
            connection_id = %intent.connection_id(),
            connected_ms = %intent.connection_time().as_millis(),
            "Client left"
        );
        Ok(Value::Null)
    });

    for action in ["ws#room.join", "ws#room.leave", "ws#room.clear"] {
        engine.register_fn(action, |_intent: Intent| async { Ok(Value::Null) });
    }

    engine.register_fn("ws#room.join:chat/:id", |intent: Intent| async move {
        let params = intent.params();
        Ok(json!({ "chat": params.get("id") }))
    });

    engine.register_fn("echo", |intent: Intent| async move { Ok(intent.payload().clone()) });

    engine.register_fn("chat.send", |intent: Intent| async move {
        let Some(text) = intent
            .payload()
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        else {
            return Err(ActionError::new("CHAT.EMPTY", "Message text is required"));
        };

        let from = intent
            .authorization()
            .and_then(|c| c.subject())
            .unwrap_or(intent.connection_id());
        Ok(json!({ "from": from, "text": text }))
    });
}
