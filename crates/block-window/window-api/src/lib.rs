//! # `window-api`
//!
//! Read-only HTTP access to the block window.
//!
//! ## Routes
//!
//! | method | path | query | response |
//! |--------|------|-------|----------|
//! | GET | `/v1/blocks` | | ascending list of resident block numbers |
//! | GET | `/v1/events` | `address` | events emitted by `address`, oldest first |
//! | GET | `/v1/block` | `block_number` | block header and transaction hashes |
//! | GET | `/v1/tx` | `tx_hash` | transaction |
//! | GET | `/health` | | `ok` |
//! | GET | `/ready` | | `ready` once the store answers a ping |
//!
//! Failures are answered with `{"error": "..."}`: `400` for a missing or
//! malformed parameter, `404` when the entity is not in the window and `500`
//! when the store fails.
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod metrics;
mod server;
mod service;

pub use error::QueryError;
pub use server::{
    ROUTES,
    serve,
};
pub use service::QueryService;
