//! Fixtures and a scripted [`ChainClient`] for tests across the workspace.
#![allow(clippy::expect_used)]

use crate::{
    Block,
    ChainClient,
    ChainError,
    Data,
    HeaderStream,
};
use alloy::{
    consensus::Header as ConsensusHeader,
    network::TransactionResponse,
    primitives::{
        Address,
        B256,
        Bytes,
        LogData,
    },
    rpc::types::{
        Block as RpcBlock,
        BlockTransactions,
        Header,
        Log,
        Transaction,
    },
};
use async_trait::async_trait;
use futures::{
    StreamExt,
    stream,
};
use parking_lot::Mutex;
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};

/// Header for block `number` with a hash derived from the number.
pub fn header(number: u64) -> Header {
    Header {
        hash: block_hash(number),
        inner: ConsensusHeader {
            number,
            parent_hash: block_hash(number.saturating_sub(1)),
            timestamp: 1_700_000_000 + number * 12,
            ..Default::default()
        },
        total_difficulty: None,
        size: None,
    }
}

pub fn block_hash(number: u64) -> B256 {
    B256::left_padding_from(&number.to_be_bytes())
}

/// Full block carrying `transactions`.
pub fn block(number: u64, transactions: Vec<Transaction>) -> RpcBlock {
    RpcBlock {
        header: header(number),
        uncles: Vec::new(),
        transactions: BlockTransactions::Full(transactions),
        withdrawals: None,
    }
}

/// EIP-1559 transaction whose nonce and hash are derived from `seed`.
///
/// Use `TransactionResponse::tx_hash` on the result rather than assuming the
/// hash.
pub fn transaction(seed: u8) -> Transaction {
    let tx_json = serde_json::json!({
        "blockHash": "0x8e38b4dbf6b11fcc3b9dee84fb7986e29ca0a02cecd8977c161ff7333329681e",
        "blockNumber": "0x1",
        "hash": format!("{:#x}", B256::repeat_byte(seed)),
        "transactionIndex": "0x0",
        "type": "0x2",
        "nonce": format!("{seed:#x}"),
        "input": "0x",
        "maxFeePerGas": "0x77359400",
        "maxPriorityFeePerGas": "0x3b9aca00",
        "chainId": "0x1",
        "accessList": [],
        "gas": "0x5208",
        "from": format!("{:#x}", Address::repeat_byte(0xf0)),
        "to": format!("{:#x}", Address::repeat_byte(seed)),
        "value": "0x0",
        "r": "0x1",
        "s": "0x1",
        "v": "0x1"
    });
    serde_json::from_value(tx_json).expect("fixture transaction must deserialize")
}

/// Log emitted by `address` in transaction `tx_hash` of block `block_number`.
pub fn log(address: Address, block_number: u64, tx_hash: B256, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address,
            data: LogData::new_unchecked(
                vec![B256::repeat_byte(0x11)],
                Bytes::from(log_index.to_be_bytes().to_vec()),
            ),
        },
        block_hash: Some(block_hash(block_number)),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(tx_hash),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// Record for block `number` built directly from transactions and their logs,
/// bypassing the formatter.
pub fn record(number: u64, entries: Vec<(Transaction, Vec<Log>)>) -> Data {
    let mut body = Vec::with_capacity(entries.len());
    let mut transaction_hashes = BTreeMap::new();
    let mut events = BTreeMap::new();
    for (tx, logs) in entries {
        let hash = tx.tx_hash();
        body.push(hash);
        transaction_hashes.insert(hash, tx);
        events.insert(hash, logs);
    }
    Data {
        block: Block {
            header: header(number),
            body,
        },
        transaction_hashes,
        events,
    }
}

/// Scripted chain used by formatter, notifier and bootstrapper tests.
///
/// Unknown blocks and receipts resolve to not-found errors. The header stream
/// replays the script once; when `hold_open` is set it then stays pending
/// instead of ending.
#[derive(Debug, Default)]
pub struct MockChain {
    head: Mutex<u64>,
    blocks: Mutex<HashMap<u64, RpcBlock>>,
    receipts: Mutex<HashMap<B256, Vec<Log>>>,
    failing_blocks: Mutex<HashSet<u64>>,
    headers: Mutex<Vec<Result<Header, String>>>,
    hold_open: Mutex<bool>,
    fetched: Mutex<Vec<u64>>,
    subscriptions: Mutex<usize>,
    closed: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: Mutex::new(head),
            ..Default::default()
        }
    }

    /// Register a block and the receipts of its transactions.
    pub fn add_block(&self, block: RpcBlock, receipts: Vec<(B256, Vec<Log>)>) {
        self.blocks.lock().insert(block.header.number, block);
        self.receipts.lock().extend(receipts);
    }

    /// Register an empty block for every number in `range`.
    pub fn add_empty_blocks(&self, range: std::ops::RangeInclusive<u64>) {
        let mut blocks = self.blocks.lock();
        for number in range {
            blocks.insert(number, block(number, Vec::new()));
        }
    }

    pub fn add_receipt(&self, tx_hash: B256, logs: Vec<Log>) {
        self.receipts.lock().insert(tx_hash, logs);
    }

    /// Make `block_by_number(number)` fail with a transport-like error.
    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().insert(number);
    }

    /// Script the header subscription.
    pub fn script_headers(&self, headers: Vec<Result<Header, String>>, hold_open: bool) {
        *self.headers.lock() = headers;
        *self.hold_open.lock() = hold_open;
    }

    /// Block numbers requested through `block_by_number`, in call order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().clone()
    }

    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock()
    }

    /// Header streams closed through [`HeaderStream::close`].
    pub fn closed_subscriptions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn head_number(&self) -> Result<u64, ChainError> {
        Ok(*self.head.lock())
    }

    async fn block_by_number(&self, number: u64) -> Result<RpcBlock, ChainError> {
        self.fetched.lock().push(number);
        if self.failing_blocks.lock().contains(&number) {
            return Err(ChainError::Subscription(format!(
                "connection reset while fetching block {number}"
            )));
        }
        self.blocks
            .lock()
            .get(&number)
            .cloned()
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn receipt_logs(&self, tx_hash: B256) -> Result<Vec<Log>, ChainError> {
        self.receipts
            .lock()
            .get(&tx_hash)
            .cloned()
            .ok_or(ChainError::ReceiptNotFound(tx_hash))
    }

    async fn subscribe_headers(&self) -> Result<HeaderStream, ChainError> {
        *self.subscriptions.lock() += 1;
        let script = std::mem::take(&mut *self.headers.lock());
        let scripted = stream::iter(
            script
                .into_iter()
                .map(|item| item.map_err(ChainError::Subscription)),
        );
        let headers = if *self.hold_open.lock() {
            scripted.chain(stream::pending()).boxed()
        } else {
            scripted.boxed()
        };
        let closed = self.closed.clone();
        Ok(HeaderStream::new(headers).on_close(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
