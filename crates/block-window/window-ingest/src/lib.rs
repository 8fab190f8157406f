//! Ingestion side of the block window.
//!
//! Two producers turn chain blocks into [`Data`](window_core::Data) records:
//!
//! - [`Notifier`] follows the `newHeads` subscription and publishes each record
//!   on a notification channel.
//! - [`Bootstrapper`] runs once at startup, writing the latest blocks straight
//!   into the store with staggered TTLs.
//!
//! [`Indexer`] consumes the channel and writes every record it receives into
//! the store with the configured retention TTL.
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::unreachable)]
#![deny(clippy::todo)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bootstrap;
mod indexer;
mod macros;
mod metrics;
mod notifier;
pub mod transport;

pub use bootstrap::{
    BootstrapConfig,
    BootstrapError,
    BootstrapReport,
    Bootstrapper,
    block_range,
    expiry_for,
};
pub use indexer::{
    Indexer,
    IndexerError,
};
pub use notifier::{
    Notifier,
    NotifierError,
    NotifierState,
};
pub use transport::{
    LocalTransport,
    Publisher,
    RedisTransport,
    Subscription,
    Transport,
    TransportError,
};
