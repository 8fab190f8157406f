//! Query API metrics.
//!
//! - `block_window_query_requests_total{endpoint, status}`: requests served
//! - `block_window_query_duration_seconds{endpoint}`: time to answer a request

use metrics::{
    counter,
    histogram,
};
use std::time::Duration;

pub fn record_request(endpoint: &'static str, status: u16, elapsed: Duration) {
    counter!(
        "block_window_query_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("block_window_query_duration_seconds", "endpoint" => endpoint)
        .record(elapsed.as_secs_f64());
}
