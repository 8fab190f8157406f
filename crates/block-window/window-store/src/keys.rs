//! Key construction for the three record families.

use alloy::primitives::{
    Address,
    B256,
};

pub const BLOCK_PREFIX: &str = "block:";
pub const TRANSACTION_PREFIX: &str = "tx:";
pub const EVENT_PREFIX: &str = "event:";

/// Separates the components of an event key.
pub const SEPARATOR: char = '_';

pub fn block_key(number: u64) -> String {
    format!("{BLOCK_PREFIX}{number}")
}

pub fn transaction_key(tx_hash: B256) -> String {
    format!("{TRANSACTION_PREFIX}{tx_hash:#x}")
}

pub fn event_key(address: Address, block_number: u64, tx_hash: B256, log_index: u64) -> String {
    format!(
        "{EVENT_PREFIX}{address:#x}{SEPARATOR}{block_number}{SEPARATOR}{tx_hash:#x}{SEPARATOR}{log_index}"
    )
}

/// Pattern matching every event key of `address`.
///
/// The trailing separator keeps one address from matching another that it
/// happens to prefix.
pub fn events_by_address_pattern(address: Address) -> String {
    format!("{EVENT_PREFIX}{address:#x}{SEPARATOR}*")
}

pub fn all_blocks_pattern() -> String {
    format!("{BLOCK_PREFIX}*")
}

/// Block number encoded in a block-family key.
pub fn parse_block_key(key: &str) -> Option<u64> {
    key.strip_prefix(BLOCK_PREFIX)?.parse().ok()
}
