use super::{
    Publisher,
    Subscription,
    Transport,
    TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process transport over `tokio::sync::broadcast`, one sender per channel
/// name. Clones share channels.
#[derive(Clone, Debug)]
pub struct LocalTransport {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    capacity: usize,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose channels buffer at most `capacity` undelivered
    /// payloads per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscriptions on `channel`.
    pub fn receiver_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl Publisher for LocalTransport {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        // Sending without subscribers is not an error, matching `PUBLISH`.
        Ok(self.sender(channel).send(payload).unwrap_or(0))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, TransportError> {
        Ok(Box::new(LocalSubscription {
            receiver: self.sender(channel).subscribe(),
            channel: channel.to_owned(),
        }))
    }
}

struct LocalSubscription {
    receiver: broadcast::Receiver<Vec<u8>>,
    channel: String,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(Ok(payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, payloads dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(self: Box<Self>) {}
}
