//! Process-local backend.
//!
//! Expiry is measured on the Tokio clock so tests can drive TTLs with
//! `tokio::time::pause` and `advance`. Expired entries are evicted when a
//! scan passes over them and by [`MemoryStore::run_sweeper`].

use crate::{
    KeyValueStore,
    StoreError,
    StoreResult,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// [`KeyValueStore`] held in memory. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired entry and return how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Purge expired entries every `every` until `shutdown` fires.
    pub async fn run_sweeper(&self, every: Duration, shutdown: CancellationToken) {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticks.tick() => {
                    let evicted = self.purge_expired();
                    if evicted > 0 {
                        debug!(evicted, "evicted expired entries");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Err(StoreError::ZeroTtl);
        }
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Err(StoreError::ZeroTtl);
        }
        let expires_at = Instant::now() + ttl;
        self.entries.write().extend(
            entries
                .into_iter()
                .map(|(key, value)| (key, Entry { value, expires_at })),
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Scans every entry, so expired ones are evicted on the way.
    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut keys = Vec::new();
        self.entries.write().retain(|key, entry| {
            if !entry.is_live(now) {
                return false;
            }
            if matches_pattern(pattern, key) {
                keys.push(key.clone());
            }
            true
        });
        keys.sort_unstable();
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// `prefix*` matches by prefix, anything else must equal the key.
fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}
