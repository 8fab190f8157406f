use crate::{
    critical,
    metrics,
    transport::{
        Transport,
        TransportError,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};
use window_core::Data;
use window_store::{
    IndexedStore,
    RecordStats,
    StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Failed to subscribe to channel '{channel}'")]
    Subscribe {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Failed to decode record payload")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to index block {block_number}")]
    Store {
        block_number: u64,
        #[source]
        source: StoreError,
    },
}

/// Consumes records from the notification channel and writes them into the
/// store with a fixed TTL.
///
/// Bad payloads and failed writes are logged and skipped. There is no retry
/// queue: a record that could not be written is simply missing from the
/// window.
pub struct Indexer {
    transport: Arc<dyn Transport>,
    store: IndexedStore,
    channel: String,
    ttl: Duration,
}

impl Indexer {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: IndexedStore,
        channel: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            channel: channel.into(),
            ttl,
        }
    }

    /// Index payloads until `shutdown` fires.
    ///
    /// The subscription is closed before returning `Ok(())`. A channel that
    /// goes away underneath the indexer is reported as
    /// [`IndexerError::ChannelClosed`].
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), IndexerError> {
        let mut subscription = self
            .transport
            .subscribe(&self.channel)
            .await
            .map_err(|source| {
                IndexerError::Subscribe {
                    channel: self.channel.clone(),
                    source,
                }
            })?;
        info!(channel = %self.channel, "indexer subscribed");

        loop {
            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                message = subscription.next_message() => message,
            };

            match message {
                Some(Ok(payload)) => {
                    if let Err(err) = self.index_payload(&payload).await {
                        self.report(&err);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = ?err, channel = %self.channel, "failed to receive payload");
                }
                None => {
                    warn!(channel = %self.channel, "notification channel closed");
                    return Err(IndexerError::ChannelClosed);
                }
            }
        }

        subscription.close().await;
        info!("indexer shut down");
        Ok(())
    }

    /// Decode one payload and write its three key families.
    pub async fn index_payload(&self, payload: &[u8]) -> Result<RecordStats, IndexerError> {
        let record = Data::decode(payload).map_err(IndexerError::Decode)?;
        let block_number = record.block_number();
        let stats = self
            .store
            .put_record(&record, self.ttl)
            .await
            .map_err(|source| IndexerError::Store { block_number, source })?;

        metrics::record_indexed();
        debug!(
            block_number,
            transactions = stats.transactions,
            events = stats.events,
            "indexed block"
        );
        Ok(stats)
    }

    fn report(&self, err: &IndexerError) {
        match err {
            IndexerError::Decode(_) => {
                warn!(error = ?err, "skipping undecodable payload");
                metrics::record_decode_failure();
            }
            IndexerError::Store { block_number, .. } => {
                critical!(error = ?err, block_number, "failed to index block");
                metrics::record_index_failure();
            }
            IndexerError::Subscribe { .. } | IndexerError::ChannelClosed => {
                warn!(error = ?err, "unexpected indexer error");
            }
        }
    }
}
