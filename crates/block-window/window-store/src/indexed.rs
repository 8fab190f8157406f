use crate::{
    KeyValueStore,
    StoreError,
    StoreResult,
    keys,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    warn,
};
use window_core::{
    Block,
    Data,
    types::{
        Address,
        B256,
        Log,
        Transaction,
    },
};

/// Number of entries written for one record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub transactions: usize,
    pub events: usize,
}

/// Projects [`Data`] records into the block, transaction and event key
/// families and resolves lookups against them.
///
/// The three families of a record are written independently. A failure part
/// way through leaves whatever was already written in place; entries only
/// disappear through expiry.
#[derive(Clone)]
pub struct IndexedStore {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for IndexedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStore").finish_non_exhaustive()
    }
}

impl IndexedStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn put_block(&self, record: &Data, ttl: Duration) -> StoreResult<()> {
        let value = encode("block", &record.block)?;
        self.kv
            .set(&keys::block_key(record.block_number()), value, ttl)
            .await
    }

    /// Write one entry per transaction as a single batch.
    pub async fn put_transactions(&self, record: &Data, ttl: Duration) -> StoreResult<usize> {
        let entries = record
            .transaction_hashes
            .iter()
            .map(|(hash, tx)| Ok((keys::transaction_key(*hash), encode("transaction", tx)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let written = entries.len();
        if written > 0 {
            self.kv.set_many(entries, ttl).await?;
        }
        Ok(written)
    }

    /// Write one entry per event as a single batch. Logs without an index
    /// fall back to their position in the transaction.
    pub async fn put_events(&self, record: &Data, ttl: Duration) -> StoreResult<usize> {
        let block_number = record.block_number();
        let mut entries = Vec::with_capacity(record.event_count());
        for (tx_hash, logs) in &record.events {
            for (position, log) in logs.iter().enumerate() {
                let log_index = log.log_index.unwrap_or(position as u64);
                let key = keys::event_key(log.inner.address, block_number, *tx_hash, log_index);
                entries.push((key, encode("event", log)?));
            }
        }
        let written = entries.len();
        if written > 0 {
            self.kv.set_many(entries, ttl).await?;
        }
        Ok(written)
    }

    /// Write all three families of `record` with the same `ttl`.
    ///
    /// Every family is attempted even if an earlier one fails; the first
    /// error is returned.
    pub async fn put_record(&self, record: &Data, ttl: Duration) -> StoreResult<RecordStats> {
        let block = self.put_block(record, ttl).await;
        let transactions = self.put_transactions(record, ttl).await;
        let events = self.put_events(record, ttl).await;

        block?;
        let stats = RecordStats {
            transactions: transactions?,
            events: events?,
        };
        debug!(
            block_number = record.block_number(),
            transactions = stats.transactions,
            events = stats.events,
            ttl_secs = ttl.as_secs(),
            "indexed record"
        );
        Ok(stats)
    }

    pub async fn get_block(&self, number: u64) -> StoreResult<Option<Block>> {
        self.get_decoded(&keys::block_key(number)).await
    }

    pub async fn get_transaction(&self, tx_hash: B256) -> StoreResult<Option<Transaction>> {
        self.get_decoded(&keys::transaction_key(tx_hash)).await
    }

    /// Every resident event emitted by `address`, ordered by block number
    /// and log index. Unknown addresses yield an empty list.
    pub async fn get_events_by_address(&self, address: Address) -> StoreResult<Vec<Log>> {
        let matched = self
            .kv
            .keys_matching(&keys::events_by_address_pattern(address))
            .await?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let values = self.kv.get_many(&matched).await?;
        let mut events = Vec::with_capacity(values.len());
        for (key, value) in matched.into_iter().zip(values) {
            // Expired between the scan and the fetch.
            let Some(value) = value else {
                continue;
            };
            events.push(decode::<Log>(&key, &value)?);
        }

        events.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(events)
    }

    /// Numbers of every resident block, ascending.
    pub async fn list_block_numbers(&self) -> StoreResult<Vec<u64>> {
        let matched = self.kv.keys_matching(&keys::all_blocks_pattern()).await?;
        let mut numbers = Vec::with_capacity(matched.len());
        for key in matched {
            match keys::parse_block_key(&key) {
                Some(number) => numbers.push(number),
                None => {
                    warn!(key = %key, "skipping malformed block key");
                }
            }
        }
        numbers.sort_unstable();
        numbers.dedup();
        Ok(numbers)
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.kv.ping().await
    }

    async fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.kv
            .get(key)
            .await?
            .map(|value| decode(key, &value))
            .transpose()
    }
}

fn encode<T: Serialize>(entity: &'static str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StoreError::Serialize { entity, source })
}

fn decode<T: DeserializeOwned>(key: &str, value: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(value).map_err(|source| {
        StoreError::Deserialize {
            key: key.to_owned(),
            source,
        }
    })
}
