//! Canonical block records for the block window.
//!
//! A [`Data`] record bundles one chain block with every transaction it contains
//! and the logs those transactions emitted. It is the unit that is published on
//! the notification channel and indexed into the store. Records are produced by
//! [`format_block`] from a full block and the receipts fetched through a
//! [`ChainClient`].
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod chain;
mod formatter;
mod model;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{
    AlloyChainClient,
    ChainClient,
    ChainError,
    HeaderStream,
};
pub use formatter::{
    FormatError,
    format_block,
};
pub use model::{
    Block,
    Data,
};

/// Re-exported alloy types that make up a record.
pub mod types {
    pub use alloy::{
        primitives::{
            Address,
            B256,
        },
        rpc::types::{
            Header,
            Log,
            Transaction,
        },
    };
}
