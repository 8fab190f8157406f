//! Time-bounded index of block window records.
//!
//! # Key layout
//!
//! Each [`Data`](window_core::Data) record is projected into three key
//! families that share one TTL:
//!
//! | family | key | value |
//! |--------|-----|-------|
//! | block | `block:{number}` | JSON [`Block`](window_core::Block) |
//! | transaction | `tx:{tx_hash}` | JSON transaction |
//! | event | `event:{address}_{number}_{tx_hash}_{log_index}` | JSON log |
//!
//! Addresses and hashes are lower-case, `0x`-prefixed hex. The address leads
//! the event key so `event:{address}_*` resolves every event of an address
//! with a single pattern scan.
//!
//! Entries are never deleted explicitly. They disappear when the backend
//! expires them.
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod indexed;
pub mod keys;
mod kv;
mod memory;
mod redis_store;

#[cfg(any(test, feature = "test-utils"))]
pub mod redis_test_fixture;

pub use error::{
    StoreError,
    StoreResult,
};
pub use indexed::{
    IndexedStore,
    RecordStats,
};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
