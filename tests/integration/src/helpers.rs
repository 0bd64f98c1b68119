//! Test helpers for integration tests
//!
//! Provides a router served on an ephemeral port and a minimal WebSocket client speaking
//! the JSON frame format.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use realtime_common::RouterConfig;
use realtime_router::protocol::{ClientFrame, ServerFrame};
use realtime_router::server::{self, RouterState};
use realtime_router::Router;
use reqwest::Client;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::fixtures::{register_actions, test_engine};

/// How long a client waits for a frame
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub router: Arc<Router>,
    pub config: RouterConfig,
    pub client: Client,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_config()).await
    }

    /// Start a test server with custom config
    pub async fn start_with_config(config: RouterConfig) -> Result<Self> {
        let router = Router::builder(test_engine()).config(&config).build();
        register_actions(&router);
        router.attach().await;

        let app = server::create_app(RouterState::new(router.clone(), config.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            server::serve(listener, app).await.ok();
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            router,
            config,
            client,
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL of the router endpoint
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.config.ws.path)
    }

    /// Connect with a bearer token
    pub async fn connect(&self, token: &str) -> Result<TestClient> {
        self.connect_with_header(Some(&format!("Bearer {token}"))).await
    }

    /// Connect with a raw `Authorization` header, or none
    pub async fn connect_with_header(&self, authorization: Option<&str>) -> Result<TestClient> {
        let mut request = self.ws_url().into_client_request()?;
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert("authorization", HeaderValue::from_str(value)?);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(TestClient { ws, next_ack: 1 })
    }

    /// Status code of a rejected handshake, or `None` if the upgrade succeeded
    pub async fn handshake_status(&self, authorization: Option<&str>) -> Option<u16> {
        match self.connect_with_header(authorization).await {
            Ok(_) => None,
            Err(e) => match e.downcast_ref::<tokio_tungstenite::tungstenite::Error>() {
                Some(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                    Some(response.status().as_u16())
                }
                _ => None,
            },
        }
    }

    /// Wait until the router tracks exactly `expected` connections
    pub async fn wait_for_connections(&self, expected: usize) -> Result<()> {
        for _ in 0..100 {
            if self.router.connections().count() == expected {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!(
            "expected {expected} connections, router has {}",
            self.router.connections().count()
        )
    }

    /// Wait until the local room index holds exactly `expected` rooms
    pub async fn wait_for_rooms(&self, expected: usize) -> Result<()> {
        for _ in 0..100 {
            if self.router.connections().room_count() == expected {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!(
            "expected {expected} rooms, router has {}",
            self.router.connections().room_count()
        )
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }
}

/// WebSocket client speaking the router frame format
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_ack: u64,
}

impl TestClient {
    /// Send a frame without an ack
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        self.ws.send(Message::Text(frame.to_json()?)).await?;
        Ok(())
    }

    /// Send a frame with a fresh ack id and wait for its reply
    pub async fn request(&mut self, frame: ClientFrame) -> Result<ServerFrame> {
        let ack = self.next_ack;
        self.next_ack += 1;
        self.send(&frame.with_ack(ack)).await?;

        loop {
            match self.recv().await? {
                reply @ ServerFrame::Ack { ack: got, .. } if got == ack => return Ok(reply),
                ServerFrame::Ack { ack: got, .. } => bail!("reply for ack {got}, expected {ack}"),
                ServerFrame::Event { .. } => {}
            }
        }
    }

    /// Successful result of a request
    pub async fn call(&mut self, frame: ClientFrame) -> Result<Value> {
        match self.request(frame).await? {
            ServerFrame::Ack {
                error: None,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(anyhow!("expected a successful reply, got {other:?}")),
        }
    }

    /// `(status, code)` of a failed request
    pub async fn call_err(&mut self, frame: ClientFrame) -> Result<(u16, String)> {
        match self.request(frame).await? {
            ServerFrame::Ack {
                error: Some(error), ..
            } => Ok((error.status, error.code)),
            other => Err(anyhow!("expected an error reply, got {other:?}")),
        }
    }

    /// Next frame from the server
    pub async fn recv(&mut self) -> Result<ServerFrame> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for a frame"))?
                .ok_or_else(|| anyhow!("connection closed"))??;

            match message {
                Message::Text(text) => return Ok(ServerFrame::from_json(&text)?),
                Message::Close(_) => bail!("connection closed"),
                _ => {}
            }
        }
    }

    /// Next frame, which must be an event
    pub async fn recv_event(&mut self) -> Result<(String, Value)> {
        match self.recv().await? {
            ServerFrame::Event { event, data } => Ok((event, data)),
            other => Err(anyhow!("expected an event, got {other:?}")),
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Create a test configuration
pub fn test_config() -> RouterConfig {
    RouterConfig::default()
}
