//! Notification channel carrying serialized records between the notifier and
//! the indexer.
//!
//! Payloads are opaque bytes. Delivery is at-most-once: a subscriber that is
//! not connected when a record is published never sees it.

mod local;
mod redis_pubsub;

pub use local::LocalTransport;
pub use redis_pubsub::RedisTransport;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Redis pub/sub error")]
    Redis(#[from] redis::RedisError),

    #[error("Blocking publish task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Sending half of a notification channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `channel`. Returns the number of subscribers that
    /// received it.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError>;
}

/// Receiving half of a notification channel.
#[async_trait]
pub trait Subscription: Send {
    /// Next payload. `None` once the channel is gone.
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Unsubscribe and release the connection.
    async fn close(self: Box<Self>);
}

/// A notification channel that can be both published to and subscribed on.
#[async_trait]
pub trait Transport: Publisher {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, TransportError>;
}
