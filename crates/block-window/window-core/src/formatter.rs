use crate::{
    Block,
    ChainClient,
    ChainError,
    Data,
};
use alloy::{
    network::TransactionResponse,
    primitives::B256,
    rpc::types::{
        Block as RpcBlock,
        BlockTransactions,
    },
};
use std::collections::BTreeMap;
use tracing::{
    debug,
    instrument,
};

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Block {block_number} was returned without transaction bodies")]
    MissingTransactionBodies { block_number: u64 },

    #[error("Failed to fetch receipt for transaction {tx_hash}")]
    Receipt {
        tx_hash: B256,
        #[source]
        source: ChainError,
    },
}

/// Build the canonical record for a full block.
///
/// Receipts are fetched one transaction at a time. The first failing fetch
/// aborts the whole block so a partial record is never produced.
#[instrument(
    skip_all,
    fields(block_number = block.header.number),
    level = "debug"
)]
pub async fn format_block<C>(client: &C, block: RpcBlock) -> Result<Data, FormatError>
where
    C: ChainClient + ?Sized,
{
    let block_number = block.header.number;
    let transactions = match block.transactions {
        BlockTransactions::Full(transactions) => transactions,
        other if other.is_empty() => Vec::new(),
        _ => return Err(FormatError::MissingTransactionBodies { block_number }),
    };

    let mut body = Vec::with_capacity(transactions.len());
    let mut transaction_hashes = BTreeMap::new();
    let mut events = BTreeMap::new();

    for tx in transactions {
        let tx_hash = tx.tx_hash();
        let logs = client
            .receipt_logs(tx_hash)
            .await
            .map_err(|source| FormatError::Receipt { tx_hash, source })?;

        body.push(tx_hash);
        events.insert(tx_hash, logs);
        transaction_hashes.insert(tx_hash, tx);
    }

    debug!(
        block_number,
        transactions = body.len(),
        "formatted block"
    );

    Ok(Data {
        block: Block {
            header: block.header,
            body,
        },
        transaction_hashes,
        events,
    })
}
