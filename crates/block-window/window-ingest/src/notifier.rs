//! Live notifier: follows new chain heads and publishes one record per block.
//!
//! A block that fails to fetch, format or publish is logged and skipped; the
//! notifier keeps waiting for the next header. Only the subscription itself
//! failing ends the run. Reconnecting is left to the caller.

use crate::{
    critical,
    metrics,
    transport::{
        Publisher,
        TransportError,
    },
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};
use window_core::{
    ChainClient,
    ChainError,
    FormatError,
    format_block,
};

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Failed to open header subscription")]
    Subscribe(#[source] ChainError),

    #[error("Header subscription failed")]
    Subscription(#[source] ChainError),

    #[error("Header subscription closed")]
    SubscriptionClosed,

    #[error("Failed to fetch block {block_number}")]
    FetchBlock {
        block_number: u64,
        #[source]
        source: ChainError,
    },

    #[error("Failed to format block")]
    Format(#[from] FormatError),

    #[error("Failed to encode record")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish record")]
    Publish(#[from] TransportError),
}

/// Lifecycle of a [`Notifier`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierState {
    Idle,
    /// Waiting for the next header.
    Subscribed,
    /// Fetching, formatting and publishing a block.
    Delivering,
    /// The last block was dropped; waiting for the next header.
    ErroredRetrying,
    ShuttingDown,
    Terminated,
}

pub struct Notifier {
    chain: Arc<dyn ChainClient>,
    publisher: Arc<dyn Publisher>,
    channel: String,
    state: Mutex<NotifierState>,
}

impl Notifier {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        publisher: Arc<dyn Publisher>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            publisher,
            channel: channel.into(),
            state: Mutex::new(NotifierState::Idle),
        }
    }

    pub fn state(&self) -> NotifierState {
        *self.state.lock()
    }

    fn set_state(&self, state: NotifierState) {
        *self.state.lock() = state;
    }

    /// Publish a record for every header until `shutdown` fires or the
    /// subscription fails.
    ///
    /// Returns `Ok(())` only on shutdown. Shutdown is observed between headers,
    /// never in the middle of a delivery.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), NotifierError> {
        let mut headers = match self.chain.subscribe_headers().await {
            Ok(stream) => stream,
            Err(err) => {
                self.set_state(NotifierState::Terminated);
                return Err(NotifierError::Subscribe(err));
            }
        };
        self.set_state(NotifierState::Subscribed);
        info!(channel = %self.channel, "subscribed to new headers");

        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = headers.next() => next,
            };

            let header = match next {
                Some(Ok(header)) => header,
                Some(Err(err)) => {
                    warn!(error = %err, "header subscription failed");
                    self.set_state(NotifierState::Terminated);
                    return Err(NotifierError::Subscription(err));
                }
                None => {
                    warn!("header subscription closed");
                    self.set_state(NotifierState::Terminated);
                    return Err(NotifierError::SubscriptionClosed);
                }
            };

            if shutdown.is_cancelled() {
                break;
            }

            let block_number = header.number;
            self.set_state(NotifierState::Delivering);
            match self.deliver(block_number).await {
                Ok(()) => self.set_state(NotifierState::Subscribed),
                Err(err) => {
                    critical!(error = ?err, block_number, "failed to publish block, skipping");
                    metrics::record_publish_failure();
                    self.set_state(NotifierState::ErroredRetrying);
                }
            }
        }

        self.set_state(NotifierState::ShuttingDown);
        headers.close();
        info!("notifier shut down");
        self.set_state(NotifierState::Terminated);
        Ok(())
    }

    async fn deliver(&self, block_number: u64) -> Result<(), NotifierError> {
        let block = self
            .chain
            .block_by_number(block_number)
            .await
            .map_err(|source| NotifierError::FetchBlock { block_number, source })?;
        let record = format_block(self.chain.as_ref(), block).await?;
        let payload = record.encode()?;
        let receivers = self.publisher.publish(&self.channel, payload).await?;

        metrics::record_published(block_number);
        info!(
            block_number,
            transactions = record.transaction_hashes.len(),
            events = record.event_count(),
            "published block"
        );
        debug!(block_number, receivers, "publish delivered");
        Ok(())
    }
}
