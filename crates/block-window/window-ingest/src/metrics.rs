//! Ingestion metrics.
//!
//! ### Counters
//! - `block_window_blocks_published_total`: records published by the notifier
//! - `block_window_publish_failures_total`: headers the notifier could not deliver
//! - `block_window_blocks_bootstrapped_total`: records written by the bootstrapper
//! - `block_window_records_indexed_total`: records written by the indexer
//! - `block_window_index_failures_total`: records the indexer failed to write
//! - `block_window_decode_failures_total`: payloads that did not decode
//!
//! ### Gauges
//! - `block_window_latest_published_block`: number of the last published block

#![allow(clippy::cast_precision_loss)]

use metrics::{
    counter,
    gauge,
};

pub fn record_published(block_number: u64) {
    counter!("block_window_blocks_published_total").increment(1);
    gauge!("block_window_latest_published_block").set(block_number as f64);
}

pub fn record_publish_failure() {
    counter!("block_window_publish_failures_total").increment(1);
}

pub fn record_bootstrapped() {
    counter!("block_window_blocks_bootstrapped_total").increment(1);
}

pub fn record_indexed() {
    counter!("block_window_records_indexed_total").increment(1);
}

pub fn record_index_failure() {
    counter!("block_window_index_failures_total").increment(1);
}

pub fn record_decode_failure() {
    counter!("block_window_decode_failures_total").increment(1);
}
