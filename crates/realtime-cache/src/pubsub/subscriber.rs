//! Relay subscriber.
//!
//! A background listener owns one pub/sub connection. The handle records which relay
//! channels are wanted and tells the listener to follow; after a dropped connection the
//! listener reconnects and subscribes the whole wanted set again.

use crate::pubsub::{RelayChannel, RelayPacket};
use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::PubSub;
use redis::Client;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const CONTROL_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Relay subscriber Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Relay listener has stopped")]
    ChannelClosed,
}

pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// A message seen on one of the namespace's channels
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// `None` when the name does not decode as a relay channel
    pub channel: Option<RelayChannel>,
    /// `None` when the payload is not a relay packet
    pub packet: Option<RelayPacket>,
    pub payload: String,
}

impl ReceivedMessage {
    fn decode(namespace: &str, channel_name: &str, payload: String) -> Self {
        let packet = serde_json::from_str(&payload).ok();
        Self {
            channel: RelayChannel::parse(namespace, channel_name),
            packet,
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub redis_url: String,
    /// Must match the publisher's namespace
    pub namespace: String,
    /// Capacity of the fan-out to [`Subscriber::receiver`] handles
    pub buffer: usize,
    pub reconnect_delay: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            namespace: "realtime:ws".to_string(),
            buffer: 1024,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum Control {
    Join(Vec<String>),
    Leave(Vec<String>),
    Stop,
}

/// Why a listener session ended
enum SessionEnd {
    Stopped,
    Dropped,
}

/// Channel names wanted by the handle, shared with the listener
type Wanted = Arc<Mutex<HashSet<String>>>;

/// Handle on the relay listener
pub struct Subscriber {
    namespace: String,
    wanted: Wanted,
    messages: broadcast::Sender<ReceivedMessage>,
    control: mpsc::Sender<Control>,
}

impl Subscriber {
    /// Spawn the listener. Connecting happens in the background, so this never waits on
    /// Redis; only a malformed URL fails here.
    pub fn spawn(config: SubscriberConfig) -> SubscriberResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let (messages, _) = broadcast::channel(config.buffer);
        let (control, commands) = mpsc::channel(CONTROL_BUFFER);
        let wanted = Wanted::default();

        let listener = Listener {
            client,
            namespace: config.namespace.clone(),
            wanted: wanted.clone(),
            messages: messages.clone(),
            commands,
            reconnect_delay: config.reconnect_delay,
        };
        tokio::spawn(listener.run());

        Ok(Self {
            namespace: config.namespace,
            wanted,
            messages,
            control,
        })
    }

    /// Start receiving `channels`. Also survives reconnects.
    pub async fn subscribe(&self, channels: &[RelayChannel]) -> SubscriberResult<()> {
        let names = self.names(channels);
        self.wanted.lock().extend(names.iter().cloned());
        self.command(Control::Join(names)).await
    }

    pub async fn unsubscribe(&self, channels: &[RelayChannel]) -> SubscriberResult<()> {
        let names = self.names(channels);
        {
            let mut wanted = self.wanted.lock();
            for name in &names {
                wanted.remove(name);
            }
        }
        self.command(Control::Leave(names)).await
    }

    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.messages.subscribe()
    }

    /// Relay channels currently wanted, whether or not Redis confirmed them yet
    #[must_use]
    pub fn channels(&self) -> Vec<RelayChannel> {
        self.wanted
            .lock()
            .iter()
            .filter_map(|name| RelayChannel::parse(&self.namespace, name))
            .collect()
    }

    /// Stop the listener and close its connection
    pub async fn shutdown(&self) -> SubscriberResult<()> {
        self.command(Control::Stop).await
    }

    fn names(&self, channels: &[RelayChannel]) -> Vec<String> {
        channels.iter().map(|c| c.name(&self.namespace)).collect()
    }

    async fn command(&self, control: Control) -> SubscriberResult<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| SubscriberError::ChannelClosed)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("namespace", &self.namespace)
            .field("wanted", &self.wanted.lock().len())
            .finish_non_exhaustive()
    }
}

/// Background half of a [`Subscriber`]
struct Listener {
    client: Client,
    namespace: String,
    wanted: Wanted,
    messages: broadcast::Sender<ReceivedMessage>,
    commands: mpsc::Receiver<Control>,
    reconnect_delay: Duration,
}

impl Listener {
    async fn run(mut self) {
        loop {
            match self.session().await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Dropped) => {
                    tracing::warn!(namespace = %self.namespace, "Relay connection dropped");
                }
                Err(e) => {
                    tracing::error!(namespace = %self.namespace, error = %e, "Relay listener failed");
                }
            }
            if self.wait_to_reconnect().await.is_break() {
                break;
            }
        }

        tracing::info!(namespace = %self.namespace, "Relay listener stopped");
    }

    /// Sleep out the reconnect delay. Joins and leaves arriving meanwhile are already in
    /// the wanted set; a stop ends the listener.
    async fn wait_to_reconnect(&mut self) -> ControlFlow<()> {
        let delay = tokio::time::sleep(self.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                () = &mut delay => return ControlFlow::Continue(()),
                control = self.commands.recv() => {
                    if matches!(control, Some(Control::Stop) | None) {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    /// One connection's lifetime
    async fn session(&mut self) -> SubscriberResult<SessionEnd> {
        let mut pubsub = self.client.get_async_pubsub().await?;

        let wanted: Vec<String> = self.wanted.lock().iter().cloned().collect();
        for name in &wanted {
            pubsub.subscribe(name).await?;
        }
        tracing::info!(
            namespace = %self.namespace,
            channels = wanted.len(),
            "Relay listener connected"
        );

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(SessionEnd::Dropped);
                    };
                    let payload: String = msg.get_payload().unwrap_or_default();
                    let received = ReceivedMessage::decode(&self.namespace, msg.get_channel_name(), payload);
                    tracing::trace!(channel = %msg.get_channel_name(), "Relay message");
                    // Nobody listening yet is fine
                    let _ = self.messages.send(received);
                }

                control = self.commands.recv() => {
                    let control = match control {
                        Some(Control::Stop) | None => return Ok(SessionEnd::Stopped),
                        Some(control) => control,
                    };
                    // on_message borrows the connection
                    drop(stream);
                    apply(&mut pubsub, control).await;
                    stream = pubsub.on_message();
                }
            }
        }
    }
}

/// Forward a join or leave to Redis. Failures are logged; the wanted set still holds
/// the channel so the next reconnect retries it.
async fn apply(pubsub: &mut PubSub, control: Control) {
    match control {
        Control::Join(names) => {
            for name in names {
                match pubsub.subscribe(&name).await {
                    Ok(()) => tracing::debug!(channel = %name, "Relay channel joined"),
                    Err(e) => tracing::error!(channel = %name, error = %e, "Relay join failed"),
                }
            }
        }
        Control::Leave(names) => {
            for name in names {
                match pubsub.unsubscribe(&name).await {
                    Ok(()) => tracing::debug!(channel = %name, "Relay channel left"),
                    Err(e) => tracing::error!(channel = %name, error = %e, "Relay leave failed"),
                }
            }
        }
        Control::Stop => {}
    }
}

/// Builder for [`Subscriber`]
#[derive(Debug, Default)]
pub struct SubscriberBuilder {
    config: SubscriberConfig,
    initial: Vec<RelayChannel>,
}

impl SubscriberBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = url.into();
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.config.buffer = capacity;
        self
    }

    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Channel to join as soon as the listener connects
    #[must_use]
    pub fn subscribe(mut self, channel: RelayChannel) -> Self {
        self.initial.push(channel);
        self
    }

    pub async fn build(self) -> SubscriberResult<Subscriber> {
        let subscriber = Subscriber::spawn(self.config)?;
        if !self.initial.is_empty() {
            subscriber.subscribe(&self.initial).await?;
        }
        Ok(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_room_packet() {
        let payload = r#"{"origin":"node-b","event":"action","data":{"type":"ping"}}"#.to_string();
        let msg = ReceivedMessage::decode("app", "app#room:lobby", payload.clone());

        assert_eq!(msg.channel, Some(RelayChannel::room("lobby")));
        assert_eq!(msg.packet.map(|p| p.origin), Some("node-b".to_string()));
        assert_eq!(msg.payload, payload);
    }

    #[test]
    fn test_decode_keeps_garbage_payload() {
        let msg = ReceivedMessage::decode("app", "app#broadcast", "{oops".to_string());
        assert_eq!(msg.channel, Some(RelayChannel::Broadcast));
        assert!(msg.packet.is_none());
        assert_eq!(msg.payload, "{oops");

        let foreign = ReceivedMessage::decode("app", "other#broadcast", "{}".to_string());
        assert!(foreign.channel.is_none());
    }

    #[test]
    fn test_malformed_url_fails_fast() {
        let result = Subscriber::spawn(SubscriberConfig {
            redis_url: "definitely not redis".to_string(),
            ..SubscriberConfig::default()
        });
        assert!(matches!(result, Err(SubscriberError::Redis(_))));
    }

    #[tokio::test]
    async fn test_wanted_set_tracks_commands_without_redis() {
        // Port 1 has no listener; the background task keeps retrying
        let subscriber = SubscriberBuilder::new()
            .redis_url("redis://127.0.0.1:1")
            .namespace("app")
            .reconnect_delay(Duration::from_secs(10))
            .subscribe(RelayChannel::Broadcast)
            .build()
            .await
            .unwrap();

        subscriber
            .subscribe(&[RelayChannel::room("a"), RelayChannel::room("b")])
            .await
            .unwrap();
        subscriber.unsubscribe(&[RelayChannel::room("a")]).await.unwrap();

        let mut channels = subscriber.channels();
        channels.sort_by_key(|c| c.name("app"));
        assert_eq!(
            channels,
            vec![RelayChannel::Broadcast, RelayChannel::room("b")]
        );
    }
}
