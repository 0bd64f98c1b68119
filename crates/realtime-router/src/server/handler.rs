//! WebSocket handler
//!
//! Authorizes the handshake, then pumps frames between the socket and the router.

use crate::connection::Connection;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::router::Router;
use crate::server::RouterState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel buffer size for outgoing frames
const MESSAGE_BUFFER_SIZE: usize = 100;

/// WebSocket endpoint.
///
/// The connection is authorized before the upgrade: a rejected handshake is answered with
/// the error status and never reaches routing.
pub async fn ws_handler(
    State(state): State<RouterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let peer_addr = connect_info.map(|ConnectInfo(addr)| addr);
    let (tx, rx) = mpsc::channel::<ServerFrame>(MESSAGE_BUFFER_SIZE);

    let router = state.router().clone();
    let connection = match router.open_connection(headers, peer_addr, tx).await {
        Ok(connection) => connection,
        Err(e) => return e.into_response(),
    };

    let failed_router = router.clone();
    let failed_connection = connection.clone();

    ws.on_failed_upgrade(move |error| {
        tracing::warn!(
            connection_id = %failed_connection.id(),
            error = %error,
            "WebSocket upgrade failed"
        );
        tokio::spawn(async move {
            failed_router.disconnect(&failed_connection).await;
        });
    })
    .on_upgrade(move |socket| handle_socket(router, connection, socket, rx))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(
    router: Arc<Router>,
    connection: Arc<Connection>,
    socket: WebSocket,
    mut rx: mpsc::Receiver<ServerFrame>,
) {
    let connection_id = connection.id().to_string();
    let (mut ws_sink, mut ws_stream) = socket.split();

    let send_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame.to_json() {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        tracing::warn!(connection_id = %send_id, "Failed to send frame to WebSocket");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %send_id, error = %e, "Failed to encode frame");
                }
            }
        }

        let _ = ws_sink.close().await;
    });

    let recv_router = router.clone();
    let recv_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match ClientFrame::from_json(&text) {
                    Ok(frame) => {
                        let router = recv_router.clone();
                        let connection = recv_connection.clone();
                        tokio::spawn(async move {
                            router.handle_frame(&connection, frame).await;
                        });
                    }
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %recv_connection.id(),
                            error = %e,
                            "Failed to parse frame"
                        );
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::debug!(
                        connection_id = %recv_connection.id(),
                        "Binary frames not supported"
                    );
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %recv_connection.id(), "Client closed connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %recv_connection.id(),
                        error = %e,
                        "WebSocket error"
                    );
                    recv_router.report_error(&recv_connection, &e.to_string());
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => {
            send_task.abort();
        }
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task ended");
            recv_task.abort();
        }
    }

    router.disconnect(&connection).await;
}
