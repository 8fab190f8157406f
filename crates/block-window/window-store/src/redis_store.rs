//! Redis backend for the index.
//!
//! The index is written from async tasks, but the connections used here are
//! the synchronous `redis` ones. Commands run on the blocking pool so the
//! runtime stays responsive, the same way the worker commits state.

use crate::{
    KeyValueStore,
    StoreError,
    StoreResult,
};
use async_trait::async_trait;
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::trace;

/// Number of keys requested per `SCAN` round trip.
const SCAN_COUNT: usize = 100;

/// [`KeyValueStore`] backed by a Redis server.
#[derive(Clone, Debug)]
pub struct RedisStore {
    client: Arc<redis::Client>,
}

impl RedisStore {
    /// Build a new store. The client is kept in an `Arc` so clones share it.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Execute a synchronous Redis operation on a dedicated blocking thread.
    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> StoreResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<T> {
            let mut conn = client.get_connection()?;
            func(&mut conn)
        })
        .await
        .map_err(StoreError::Join)?
    }
}

/// Millisecond TTL for `SET .. PX`. Sub-millisecond TTLs round up so an entry
/// never lands without expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Err(StoreError::ZeroTtl);
        }
        let key = key.to_owned();
        let ttl_ms = ttl_millis(ttl);
        self.with_connection(move |conn| {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms)
                .query::<()>(conn)?;
            Ok(())
        })
        .await
    }

    /// One pipelined round trip over a single connection.
    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Err(StoreError::ZeroTtl);
        }
        if entries.is_empty() {
            return Ok(());
        }
        let ttl_ms = ttl_millis(ttl);
        self.with_connection(move |conn| {
            let mut pipe = redis::pipe();
            for (key, value) in &entries {
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value.as_slice())
                    .arg("PX")
                    .arg(ttl_ms)
                    .ignore();
            }
            pipe.query::<()>(conn)?;
            trace!(keys = entries.len(), "pipelined writes");
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_owned();
        self.with_connection(move |conn| {
            let value: Option<Vec<u8>> = redis::cmd("GET").arg(&key).query(conn)?;
            Ok(value)
        })
        .await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = keys.to_vec();
        self.with_connection(move |conn| {
            let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET").arg(&keys).query(conn)?;
            Ok(values)
        })
        .await
    }

    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let pattern = pattern.to_owned();
        self.with_connection(move |conn| {
            let mut cursor = 0u64;
            let mut matched = Vec::new();

            loop {
                let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(conn)?;

                matched.extend(keys);

                cursor = new_cursor;
                if cursor == 0 {
                    break;
                }
            }

            trace!(pattern = %pattern, matched = matched.len(), "scanned keys");
            // SCAN may return a key more than once across iterations.
            matched.sort_unstable();
            matched.dedup();
            Ok(matched)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            redis::cmd("PING").query::<String>(conn)?;
            Ok(())
        })
        .await
    }
}
