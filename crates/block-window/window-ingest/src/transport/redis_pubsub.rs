use super::{
    Publisher,
    Subscription,
    Transport,
    TransportError,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{
    debug,
    trace,
};

/// Redis `PUBLISH`/`SUBSCRIBE` transport.
///
/// Publishing goes through a short-lived synchronous connection on the
/// blocking pool. Each subscription owns a dedicated async pub/sub connection.
#[derive(Clone, Debug)]
pub struct RedisTransport {
    client: Arc<redis::Client>,
}

impl RedisTransport {
    pub fn new(redis_url: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl Publisher for RedisTransport {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        let client = self.client.clone();
        let channel = channel.to_owned();
        let receivers = tokio::task::spawn_blocking(move || -> Result<usize, TransportError> {
            let mut conn = client.get_connection()?;
            let receivers: usize = redis::cmd("PUBLISH")
                .arg(&channel)
                .arg(payload)
                .query(&mut conn)?;
            Ok(receivers)
        })
        .await??;
        trace!(receivers, "published payload");
        Ok(receivers)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, TransportError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "subscribed to redis channel");
        Ok(Box::new(RedisSubscription {
            pubsub,
            channel: channel.to_owned(),
        }))
    }
}

struct RedisSubscription {
    pubsub: redis::aio::PubSub,
    channel: String,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        let message = self.pubsub.on_message().next().await?;
        Some(Ok(message.get_payload_bytes().to_vec()))
    }

    async fn close(mut self: Box<Self>) {
        if let Err(error) = self.pubsub.unsubscribe(&self.channel).await {
            debug!(channel = %self.channel, %error, "failed to unsubscribe cleanly");
        }
    }
}
