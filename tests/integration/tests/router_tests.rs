//! Router Integration Tests
//!
//! Runs the router on an ephemeral port and talks to it over real WebSocket connections.
//! No external services are needed.
//!
//! Run with: cargo test -p integration-tests --test router_tests

use integration_tests::{action_frame, join_frame, unique_room, TestServer};
use realtime_router::protocol::ClientFrame;
use realtime_router::EventEnvelope;
use serde_json::json;

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health").await.expect("Request failed");

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_without_credentials_is_401() {
    let server = TestServer::start().await.expect("Failed to start server");

    assert_eq!(server.handshake_status(None).await, Some(401));
    assert_eq!(server.router.connections().count(), 0);
}

#[tokio::test]
async fn test_handshake_with_unusable_credentials_is_403() {
    let server = TestServer::start().await.expect("Failed to start server");

    assert_eq!(
        server.handshake_status(Some("Basic dXNlcjpwYXNz")).await,
        Some(403)
    );
}

#[tokio::test]
async fn test_handshake_with_token_is_admitted() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.expect("Failed to connect");

    let result = client
        .call(action_frame("whoami", json!({})))
        .await
        .unwrap();
    assert_eq!(result["credential"], "TOKEN");
    assert_eq!(server.router.connections().count(), 1);
}

// ============================================================================
// Action Tests
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.unwrap();

    let result = client
        .call(action_frame("echo", json!({"text": "hello"})))
        .await
        .unwrap();
    assert_eq!(result, json!({"text": "hello"}));
}

#[tokio::test]
async fn test_alias_channel() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.unwrap();

    let result = client
        .call(ClientFrame::new("say", vec![json!({"text": "aliased"})]))
        .await
        .unwrap();
    assert_eq!(result, json!({"text": "aliased"}));
}

#[tokio::test]
async fn test_error_replies() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.unwrap();

    assert_eq!(
        client
            .call_err(action_frame("no.such.action", json!({})))
            .await
            .unwrap(),
        (404, "TRANSPORT.NOT_FOUND".to_string())
    );

    assert_eq!(
        client.call_err(action_frame("reject", json!({}))).await.unwrap(),
        (422, "TEST.REJECTED".to_string())
    );

    assert_eq!(
        client.call_err(action_frame("orphan", json!({}))).await.unwrap().0,
        404
    );

    server.router.disable("echo");
    assert_eq!(
        client.call_err(action_frame("echo", json!({}))).await.unwrap(),
        (502, "TRANSPORT.UNAVAILABLE".to_string())
    );

    server.router.enable("echo");
    assert!(client.call(action_frame("echo", json!({}))).await.is_ok());
}

#[tokio::test]
async fn test_action_frame_without_type_is_ignored() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.unwrap();

    client
        .send(&ClientFrame::new("dispatch", vec![json!("not an object")]))
        .await
        .unwrap();

    let result = client
        .call(action_frame("echo", json!({"still": "alive"})))
        .await
        .unwrap();
    assert_eq!(result, json!({"still": "alive"}));
}

// ============================================================================
// Room Tests
// ============================================================================

#[tokio::test]
async fn test_room_emit_reaches_members_only() {
    let server = TestServer::start().await.expect("Failed to start server");
    let room = unique_room("lobby");

    let mut member = server.connect("member").await.unwrap();
    let mut outsider = server.connect("outsider").await.unwrap();

    let joined = member.call(join_frame(&room)).await.unwrap();
    assert_eq!(joined, json!({"type": "room.join", "room": room}));

    let report = server
        .router
        .emit(EventEnvelope::new("room.news").to_room(&room).payload(json!({"n": 1})))
        .await
        .expect("router is attached");
    assert_eq!(report.delivered, 1);

    let (event, data) = member.recv_event().await.unwrap();
    assert_eq!(event, "action");
    assert_eq!(data, json!({"type": "room.news", "payload": {"n": 1}}));

    // The outsider only sees its own reply
    let result = outsider.call(action_frame("echo", json!({}))).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn test_room_leave_and_clear() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect("abc").await.unwrap();
    let first = unique_room("a");
    let second = unique_room("b");

    client.call(join_frame(&first)).await.unwrap();
    client.call(join_frame(&second)).await.unwrap();
    assert_eq!(server.router.connections().room_count(), 2);

    let left = client
        .call(ClientFrame::new("room.leave", vec![json!(first)]))
        .await
        .unwrap();
    assert_eq!(left, json!({"type": "room.leave", "room": first}));

    let cleared = client
        .call(ClientFrame::new("room.clear", vec![]))
        .await
        .unwrap();
    assert_eq!(cleared, json!({"type": "room.clear"}));
    assert_eq!(server.router.connections().room_count(), 0);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_broadcast_and_disconnect() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut first = server.connect("one").await.unwrap();
    let mut second = server.connect("two").await.unwrap();
    server.wait_for_connections(2).await.unwrap();

    let report = server
        .router
        .emit(EventEnvelope::new("announcement"))
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);

    for client in [&mut first, &mut second] {
        let (_, data) = client.recv_event().await.unwrap();
        assert_eq!(data["type"], "announcement");
    }

    let room = unique_room("gone");
    first.call(join_frame(&room)).await.unwrap();
    first.close().await.unwrap();

    server.wait_for_connections(1).await.unwrap();
    server.wait_for_rooms(0).await.unwrap();
}
