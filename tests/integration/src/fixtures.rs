//! Test fixtures
//!
//! Actions and handlers registered on every test server, plus frame builders.

use realtime_router::dispatch::{ActionError, HandlerEngine, Intent};
use realtime_router::protocol::ClientFrame;
use realtime_router::{ActionDescriptor, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Unique room name
pub fn unique_room(prefix: &str) -> String {
    format!("{prefix}-{}", unique_suffix())
}

/// Engine with the handlers used by the tests
pub fn test_engine() -> Arc<HandlerEngine> {
    let engine = HandlerEngine::new_shared();

    for action in ["ws#room.join", "ws#room.leave", "ws#room.clear"] {
        engine.register_fn(action, |_intent: Intent| async { Ok(Value::Null) });
    }

    engine.register_fn("echo", |intent: Intent| async move { Ok(intent.payload().clone()) });

    engine.register_fn("whoami", |intent: Intent| async move {
        Ok(json!({
            "connection": intent.connection_id(),
            "credential": intent.authorization().map(|c| c.kind()),
        }))
    });

    engine.register_fn("reject", |_intent: Intent| async {
        Err(ActionError::new("TEST.REJECTED", "Rejected on purpose").with_status(422))
    });

    engine
}

/// Register the test actions on `router`
pub fn register_actions(router: &Router) {
    router.add_handler(ActionDescriptor::new("ws#room.join"));
    router.add_handler(ActionDescriptor::new("ws#room.leave"));
    router.add_handler(ActionDescriptor::new("ws#room.clear"));
    router.add_handler(ActionDescriptor::new("echo").alias("say"));
    router.add_handler(ActionDescriptor::new("whoami"));
    router.add_handler(ActionDescriptor::new("reject"));
    // Registered but without a handler in the engine
    router.add_handler(ActionDescriptor::new("orphan"));
}

/// Frame on the multiplexed action channel
pub fn action_frame(action: &str, payload: Value) -> ClientFrame {
    ClientFrame::new("dispatch", vec![json!({ "type": action, "payload": payload })])
}

/// `room.join` frame
pub fn join_frame(room: &str) -> ClientFrame {
    ClientFrame::new("room.join", vec![json!(room)])
}
