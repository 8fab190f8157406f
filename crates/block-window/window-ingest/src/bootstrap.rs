//! One-shot warm-up of the block window.
//!
//! Writes the blocks `head - N ..= head` oldest first. The `i`-th block
//! written expires after `(i + 1) * avg_block_time`, so the bootstrapped
//! blocks age out one block time apart instead of all at once.

use crate::metrics;
use std::{
    ops::RangeInclusive,
    sync::Arc,
    time::Duration,
};
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
use window_store::{
    IndexedStore,
    StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to read chain head")]
    Head(#[source] ChainError),

    #[error("Failed to fetch block {block_number}")]
    FetchBlock {
        block_number: u64,
        #[source]
        source: ChainError,
    },

    #[error("Failed to format block {block_number}")]
    Format {
        block_number: u64,
        #[source]
        source: FormatError,
    },

    #[error("Failed to store block {block_number}")]
    Store {
        block_number: u64,
        #[source]
        source: StoreError,
    },

    #[error("Bootstrap did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Blocks behind head to include.
    pub blocks_to_sync: u64,
    pub avg_block_time: Duration,
    /// Upper bound for the whole run.
    pub deadline: Duration,
}

/// Outcome of a bootstrap run that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootstrapReport {
    pub head: u64,
    pub synced: u64,
    /// Shutdown was requested before every block was written.
    pub interrupted: bool,
}

/// Blocks covered by a bootstrap from `head`, oldest first.
pub fn block_range(head: u64, blocks_to_sync: u64) -> RangeInclusive<u64> {
    head.saturating_sub(blocks_to_sync)..=head
}

/// TTL of the `index`-th block written, counting from zero at the oldest.
pub fn expiry_for(index: u64, avg_block_time: Duration) -> Duration {
    let multiplier = u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX);
    avg_block_time.saturating_mul(multiplier)
}

pub struct Bootstrapper {
    chain: Arc<dyn ChainClient>,
    store: IndexedStore,
    config: BootstrapConfig,
}

impl Bootstrapper {
    pub fn new(chain: Arc<dyn ChainClient>, store: IndexedStore, config: BootstrapConfig) -> Self {
        Self {
            chain,
            store,
            config,
        }
    }

    /// Run the bootstrap once under the configured deadline.
    ///
    /// The first failing block stops the run; blocks already written stay in
    /// the store. Shutdown is honoured between blocks.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<BootstrapReport, BootstrapError> {
        let result = tokio::time::timeout(self.config.deadline, self.sync(&shutdown))
            .await
            .unwrap_or(Err(BootstrapError::DeadlineExceeded(self.config.deadline)));

        match &result {
            Ok(report) => {
                info!(
                    head = report.head,
                    synced = report.synced,
                    interrupted = report.interrupted,
                    "bootstrap finished"
                );
            }
            Err(err) => {
                warn!(error = ?err, "bootstrap aborted");
            }
        }
        result
    }

    async fn sync(&self, shutdown: &CancellationToken) -> Result<BootstrapReport, BootstrapError> {
        let head = self
            .chain
            .head_number()
            .await
            .map_err(BootstrapError::Head)?;
        let range = block_range(head, self.config.blocks_to_sync);
        info!(
            head,
            from = range.start(),
            to = range.end(),
            "bootstrapping block window"
        );

        let mut report = BootstrapReport {
            head,
            synced: 0,
            interrupted: false,
        };

        for (index, block_number) in (0u64..).zip(range) {
            if shutdown.is_cancelled() {
                info!(block_number, "shutdown requested, stopping bootstrap");
                report.interrupted = true;
                return Ok(report);
            }

            let block = self
                .chain
                .block_by_number(block_number)
                .await
                .map_err(|source| BootstrapError::FetchBlock { block_number, source })?;
            let record = format_block(self.chain.as_ref(), block)
                .await
                .map_err(|source| BootstrapError::Format { block_number, source })?;

            let ttl = expiry_for(index, self.config.avg_block_time);
            self.store
                .put_record(&record, ttl)
                .await
                .map_err(|source| BootstrapError::Store { block_number, source })?;

            metrics::record_bootstrapped();
            report.synced += 1;
            debug!(block_number, ttl_secs = ttl.as_secs(), "bootstrapped block");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::B256,
        rpc::types::{
            Block as RpcBlock,
            Log,
        },
    };
    use async_trait::async_trait;
    use window_core::{
        HeaderStream,
        test_utils::MockChain,
    };
    use window_store::{
        MemoryStore,
        keys,
    };

    const AVG_BLOCK_TIME: Duration = Duration::from_secs(13);

    fn config(blocks_to_sync: u64) -> BootstrapConfig {
        BootstrapConfig {
            blocks_to_sync,
            avg_block_time: AVG_BLOCK_TIME,
            deadline: Duration::from_secs(300),
        }
    }

    fn setup(chain: MockChain, blocks_to_sync: u64) -> (Arc<MockChain>, MemoryStore, Bootstrapper) {
        let chain = Arc::new(chain);
        let kv = MemoryStore::new();
        let bootstrapper = Bootstrapper::new(
            chain.clone(),
            IndexedStore::new(Arc::new(kv.clone())),
            config(blocks_to_sync),
        );
        (chain, kv, bootstrapper)
    }

    #[test]
    fn expiry_grows_by_one_block_time_per_block() {
        assert_eq!(expiry_for(0, AVG_BLOCK_TIME), Duration::from_secs(13));
        assert_eq!(expiry_for(49, AVG_BLOCK_TIME), Duration::from_secs(650));
        assert_eq!(expiry_for(u64::MAX, AVG_BLOCK_TIME), AVG_BLOCK_TIME * u32::MAX);
    }

    #[test]
    fn range_is_clamped_at_genesis() {
        assert_eq!(block_range(1000, 49), 951..=1000);
        assert_eq!(block_range(10, 49), 0..=10);
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_ttls_expire_oldest_first() {
        let chain = MockChain::new(1000);
        chain.add_empty_blocks(951..=1000);
        let (chain, kv, bootstrapper) = setup(chain, 49);

        let report = bootstrapper.run(CancellationToken::new()).await.unwrap();

        assert_eq!(
            report,
            BootstrapReport {
                head: 1000,
                synced: 50,
                interrupted: false
            }
        );
        assert_eq!(chain.fetched(), (951..=1000).collect::<Vec<_>>());
        assert_eq!(kv.ttl(&keys::block_key(951)), Some(Duration::from_secs(13)));
        assert_eq!(kv.ttl(&keys::block_key(1000)), Some(Duration::from_secs(650)));
        for (index, number) in (0u32..).zip(951..=1000u64) {
            assert_eq!(kv.ttl(&keys::block_key(number)), Some(AVG_BLOCK_TIME * (index + 1)));
        }

        tokio::time::advance(AVG_BLOCK_TIME).await;
        let store = IndexedStore::new(Arc::new(kv.clone()));
        assert_eq!(store.get_block(951).await.unwrap(), None);
        assert!(store.get_block(952).await.unwrap().is_some());
        assert_eq!(store.list_block_numbers().await.unwrap().len(), 49);
    }

    #[tokio::test]
    async fn fetch_failure_stops_remaining_blocks() {
        let chain = MockChain::new(1000);
        chain.add_empty_blocks(951..=1000);
        chain.fail_block(960);
        let (chain, kv, bootstrapper) = setup(chain, 49);

        let err = bootstrapper.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, BootstrapError::FetchBlock { block_number: 960, .. }));
        assert_eq!(chain.fetched().last(), Some(&960));
        let store = IndexedStore::new(Arc::new(kv));
        assert_eq!(
            store.list_block_numbers().await.unwrap(),
            (951..960).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn shutdown_is_honoured_between_blocks() {
        let chain = MockChain::new(1000);
        chain.add_empty_blocks(951..=1000);
        let (chain, kv, bootstrapper) = setup(chain, 49);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = bootstrapper.run(shutdown).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.synced, 0);
        assert!(chain.fetched().is_empty());
        assert!(kv.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_a_stalled_run() {
        struct StalledChain;

        #[async_trait]
        impl ChainClient for StalledChain {
            async fn head_number(&self) -> Result<u64, ChainError> {
                Ok(1000)
            }
            async fn block_by_number(&self, _number: u64) -> Result<RpcBlock, ChainError> {
                std::future::pending().await
            }
            async fn receipt_logs(&self, tx_hash: B256) -> Result<Vec<Log>, ChainError> {
                Err(ChainError::ReceiptNotFound(tx_hash))
            }
            async fn subscribe_headers(&self) -> Result<HeaderStream, ChainError> {
                Err(ChainError::Subscription("unsupported".to_owned()))
            }
        }

        let bootstrapper = Bootstrapper::new(
            Arc::new(StalledChain),
            IndexedStore::new(Arc::new(MemoryStore::new())),
            config(49),
        );

        let err = bootstrapper.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::DeadlineExceeded(d) if d == Duration::from_secs(300)));
    }
}
