use crate::QueryError;
use std::str::FromStr;
use tracing::debug;
use window_core::{
    Block,
    types::{
        Address,
        B256,
        Log,
        Transaction,
    },
};
use window_store::IndexedStore;

/// Read-through facade over the [`IndexedStore`].
///
/// Parameters arrive as raw query-string values. They are validated before
/// the store is touched.
#[derive(Clone, Debug)]
pub struct QueryService {
    store: IndexedStore,
}

impl QueryService {
    pub fn new(store: IndexedStore) -> Self {
        Self { store }
    }

    pub async fn list_blocks(&self) -> Result<Vec<u64>, QueryError> {
        Ok(self.store.list_block_numbers().await?)
    }

    /// Events emitted by `address`. An address without events yields an empty
    /// list.
    pub async fn events_by_address(&self, address: Option<&str>) -> Result<Vec<Log>, QueryError> {
        let address: Address = parse_hex("address", address)?;
        let events = self.store.get_events_by_address(address).await?;
        debug!(%address, events = events.len(), "resolved events");
        Ok(events)
    }

    pub async fn block_by_number(&self, block_number: Option<&str>) -> Result<Block, QueryError> {
        let raw = required("block_number", block_number)?;
        let number: u64 = raw.parse().map_err(|err: std::num::ParseIntError| {
            QueryError::InvalidParameter {
                name: "block_number",
                reason: err.to_string(),
            }
        })?;
        self.store
            .get_block(number)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("block {number}")))
    }

    pub async fn transaction_by_hash(
        &self,
        tx_hash: Option<&str>,
    ) -> Result<Transaction, QueryError> {
        let hash: B256 = parse_hex("tx_hash", tx_hash)?;
        self.store
            .get_transaction(hash)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("transaction {hash:#x}")))
    }

    /// Whether the backing store answers.
    pub async fn ping(&self) -> Result<(), QueryError> {
        Ok(self.store.ping().await?)
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, QueryError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(QueryError::MissingParameter(name)),
    }
}

/// Parse a hex parameter after lowercasing it, so mixed-case input never
/// trips checksum validation.
fn parse_hex<T>(name: &'static str, value: Option<&str>) -> Result<T, QueryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    required(name, value)?
        .to_ascii_lowercase()
        .parse()
        .map_err(|err: T::Err| {
            QueryError::InvalidParameter {
                name,
                reason: err.to_string(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::network::TransactionResponse;
    use async_trait::async_trait;
    use std::{
        sync::{
            Arc,
            atomic::{
                AtomicUsize,
                Ordering,
            },
        },
        time::Duration,
    };
    use window_core::test_utils::{
        log,
        record,
        transaction,
    };
    use window_store::{
        KeyValueStore,
        MemoryStore,
        StoreResult,
    };

    const TTL: Duration = Duration::from_secs(650);

    /// Counts every call that reaches the backend.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for CountingStore {
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
            self.hit();
            self.inner.set(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.hit();
            self.inner.get(key).await
        }
        async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
            self.hit();
            self.inner.keys_matching(pattern).await
        }
        async fn ping(&self) -> StoreResult<()> {
            self.hit();
            self.inner.ping().await
        }
    }

    const EMITTER: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";

    async fn seeded() -> (Arc<CountingStore>, QueryService, B256) {
        let kv = Arc::new(CountingStore::default());
        let store = IndexedStore::new(kv.clone());
        let tx = transaction(1);
        let hash = tx.tx_hash();
        let emitter: Address = EMITTER.to_ascii_lowercase().parse().unwrap();
        store
            .put_record(&record(7, vec![(tx, vec![log(emitter, 7, hash, 0)])]), TTL)
            .await
            .unwrap();
        (kv, QueryService::new(store), hash)
    }

    #[tokio::test]
    async fn missing_address_is_rejected_before_the_store_is_called() {
        let (kv, service, _) = seeded().await;
        let before = kv.calls();

        for address in [None, Some(""), Some("   ")] {
            let err = service.events_by_address(address).await.unwrap_err();
            assert!(matches!(err, QueryError::MissingParameter("address")));
        }
        let err = service.events_by_address(Some("0x1234")).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidParameter { name: "address", .. }));

        assert_eq!(kv.calls(), before);
    }

    #[tokio::test]
    async fn address_without_events_is_an_empty_list() {
        let (_, service, _) = seeded().await;
        let events = service
            .events_by_address(Some("0x4242424242424242424242424242424242424242"))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn address_lookup_is_case_insensitive() {
        let (_, service, _) = seeded().await;
        let upper = service.events_by_address(Some(EMITTER)).await.unwrap();
        let lower = service
            .events_by_address(Some(&EMITTER.to_ascii_lowercase()))
            .await
            .unwrap();
        assert_eq!(upper.len(), 1);
        assert_eq!(upper, lower);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let (_, service, hash) = seeded().await;
        assert!(service.transaction_by_hash(Some(&format!("{hash:#x}"))).await.is_ok());

        let unknown = format!("{:#x}", B256::repeat_byte(0x77));
        let err = service.transaction_by_hash(Some(&unknown)).await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));
    }

    #[tokio::test]
    async fn block_lookup_validates_the_number() {
        let (_, service, hash) = seeded().await;
        let block = service.block_by_number(Some("7")).await.unwrap();
        assert_eq!(block.body, vec![hash]);

        assert!(matches!(
            service.block_by_number(Some("8")).await.unwrap_err(),
            QueryError::NotFound(_)
        ));
        assert!(matches!(
            service.block_by_number(Some("seven")).await.unwrap_err(),
            QueryError::InvalidParameter { name: "block_number", .. }
        ));
        assert!(matches!(
            service.block_by_number(None).await.unwrap_err(),
            QueryError::MissingParameter("block_number")
        ));
    }

    #[tokio::test]
    async fn blocks_are_listed() {
        let (_, service, _) = seeded().await;
        assert_eq!(service.list_blocks().await.unwrap(), vec![7]);
    }
}
