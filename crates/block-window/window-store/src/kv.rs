use crate::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Minimal key-value contract the index is built on.
///
/// Single-key operations are assumed atomic. Nothing here spans keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write `value` under `key`, expiring after `ttl`. Overwrites refresh the
    /// TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Write every entry with the same `ttl`. Backends that can batch writes
    /// should; the default writes one key at a time and stops at the first
    /// error.
    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> StoreResult<()> {
        for (key, value) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Fetch several keys at once. Missing or expired keys yield `None` in
    /// their position.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Keys matching `pattern`: a literal key, or a literal prefix followed by
    /// a single trailing `*`.
    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Round-trip check used by the readiness check.
    async fn ping(&self) -> StoreResult<()>;
}
