//! Redis adapter
//!
//! Publishes every fan-out to a namespaced Redis channel and relays packets published by
//! other instances back into the router. Rooms are subscribed only while this instance has
//! local members in them.

use super::{Adapter, AdapterError, InboundPacket, Recipient};
use async_trait::async_trait;
use realtime_cache::{
    Publisher, ReceivedMessage, RedisPool, RedisPoolConfig, RelayChannel, RelayPacket, Subscriber,
    SubscriberBuilder,
};
use realtime_common::AdapterConfig;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const INBOUND_BUFFER: usize = 1024;

/// Redis-backed adapter
pub struct RedisAdapter {
    /// Marks packets this instance published so the relay skips them
    instance_id: String,
    publisher: Publisher,
    subscriber: Subscriber,
    inbound_tx: broadcast::Sender<InboundPacket>,
    running: Arc<AtomicBool>,
}

impl RedisAdapter {
    /// Build the adapter for `config`.
    ///
    /// Returns `None`, meaning local-only fan-out, when no Redis URL is configured or Redis
    /// cannot be reached.
    pub async fn build(config: &AdapterConfig) -> Option<Arc<dyn Adapter>> {
        let pool_config = RedisPoolConfig::from_adapter(config)?;

        let pool = match RedisPool::new(&pool_config) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "Could not create adapter pool, using local fan-out");
                return None;
            }
        };

        if let Err(e) = pool.ping().await {
            tracing::warn!(
                url = %pool_config.redacted_url(),
                error = %e,
                "Redis unreachable, using local fan-out"
            );
            return None;
        }

        let subscriber = match SubscriberBuilder::new()
            .redis_url(&pool_config.url)
            .namespace(&config.channel)
            .subscribe(RelayChannel::Broadcast)
            .subscribe(RelayChannel::Direct)
            .build()
            .await
        {
            Ok(subscriber) => subscriber,
            Err(e) => {
                tracing::warn!(error = %e, "Could not start relay subscriber, using local fan-out");
                return None;
            }
        };

        let adapter = Arc::new(Self::new(
            Publisher::new(pool, config.channel.clone()),
            subscriber,
        ));
        adapter.clone().start();

        tracing::info!(
            url = %pool_config.redacted_url(),
            channel = %config.channel,
            instance_id = %adapter.instance_id,
            "Redis adapter ready"
        );

        Some(adapter)
    }

    fn new(publisher: Publisher, subscriber: Subscriber) -> Self {
        let (inbound_tx, _) = broadcast::channel(INBOUND_BUFFER);

        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            publisher,
            subscriber,
            inbound_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Spawn the task turning relay messages into inbound packets
    fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut receiver = self.subscriber.receiver();
        let adapter = self;

        tokio::spawn(async move {
            while adapter.running.load(Ordering::SeqCst) {
                match receiver.recv().await {
                    Ok(msg) => adapter.forward(msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "Redis adapter lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Redis adapter relay channel closed");
                        break;
                    }
                }
            }

            adapter.running.store(false, Ordering::SeqCst);
        });
    }

    fn forward(&self, msg: ReceivedMessage) {
        let (Some(channel), Some(packet)) = (msg.channel, msg.packet) else {
            tracing::debug!(payload = %msg.payload, "Ignoring undecodable relay message");
            return;
        };

        if packet.origin == self.instance_id {
            return;
        }

        let recipient = match channel {
            RelayChannel::Room(room) => Recipient::Room(room),
            RelayChannel::Broadcast => Recipient::All,
            RelayChannel::Direct => match packet.connection {
                Some(id) => Recipient::Connection(id),
                None => {
                    tracing::debug!(origin = %packet.origin, "Direct packet without a target");
                    return;
                }
            },
        };

        // No receivers until the relay dispatcher runs
        let _ = self.inbound_tx.send(InboundPacket {
            recipient,
            event: packet.event,
            data: packet.data,
        });
    }

    /// Stop relaying and close the subscription
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.subscriber.shutdown().await.ok();
    }
}

#[async_trait]
impl Adapter for RedisAdapter {
    fn name(&self) -> &str {
        "redis"
    }

    async fn subscribe(&self, room: &str) -> Result<(), AdapterError> {
        self.subscriber
            .subscribe(&[RelayChannel::room(room)])
            .await
            .map_err(|e| AdapterError::Subscribe {
                room: room.to_string(),
                reason: e.to_string(),
            })
    }

    async fn unsubscribe(&self, room: &str) -> Result<(), AdapterError> {
        self.subscriber
            .unsubscribe(&[RelayChannel::room(room)])
            .await
            .map_err(|e| AdapterError::Unsubscribe {
                room: room.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(
        &self,
        recipient: &Recipient,
        event: &str,
        data: &Value,
    ) -> Result<(), AdapterError> {
        let packet = RelayPacket::new(self.instance_id.as_str(), event, data.clone());

        let (channel, packet) = match recipient {
            Recipient::Connection(id) => (RelayChannel::Direct, packet.for_connection(id.as_str())),
            Recipient::Room(room) => (RelayChannel::room(room.as_str()), packet),
            Recipient::All => (RelayChannel::Broadcast, packet),
        };

        self.publisher
            .publish(&channel, &packet)
            .await
            .map(|_| ())
            .map_err(|e| AdapterError::Publish {
                recipient: recipient.clone(),
                reason: e.to_string(),
            })
    }

    fn inbound(&self) -> Option<broadcast::Receiver<InboundPacket>> {
        Some(self.inbound_tx.subscribe())
    }
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("instance_id", &self.instance_id)
            .field("publisher", &self.publisher)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_without_url_is_local_only() {
        let config = realtime_common::RouterConfig::default().adapter;
        assert!(config.redis_url.is_none());
        assert!(RedisAdapter::build(&config).await.is_none());
    }
}
