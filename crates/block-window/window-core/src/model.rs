use alloy::{
    primitives::B256,
    rpc::types::{
        Header,
        Log,
        Transaction,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// Header and ordered transaction hashes of a chain block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    /// Transaction hashes in block order.
    pub body: Vec<B256>,
}

impl Block {
    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn hash(&self) -> B256 {
        self.header.hash
    }
}

/// Canonical record for one block.
///
/// Every key of `transaction_hashes` and `events` is a member of
/// `block.body`. A transaction without logs still has an (empty) entry in
/// `events`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub block: Block,
    pub transaction_hashes: BTreeMap<B256, Transaction>,
    pub events: BTreeMap<B256, Vec<Log>>,
}

impl Data {
    pub fn block_number(&self) -> u64 {
        self.block.number()
    }

    /// Total number of logs across all transactions.
    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Hashes referenced by `transaction_hashes` or `events` that are not part
    /// of the block body.
    pub fn orphan_hashes(&self) -> Vec<B256> {
        self.transaction_hashes
            .keys()
            .chain(self.events.keys())
            .filter(|hash| !self.block.body.contains(hash))
            .copied()
            .collect()
    }

    /// Serialize the record into the payload carried on the notification
    /// channel.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
