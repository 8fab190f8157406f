//! Seam between the block window and the execution client.
//!
//! Everything the pipeline needs from a node goes through [`ChainClient`]:
//! the current head, full blocks, receipt logs and a `newHeads`
//! subscription. [`AlloyChainClient`] is the production implementation over a
//! websocket `RootProvider`.

use alloy::{
    eips::BlockNumberOrTag,
    primitives::B256,
    providers::{
        Provider,
        ProviderBuilder,
        RootProvider,
        WsConnect,
    },
    rpc::types::{
        Block as RpcBlock,
        Header,
        Log,
    },
    transports::TransportError,
};
use async_trait::async_trait;
use futures::{
    StreamExt,
    stream::BoxStream,
};
use std::fmt;
use tracing::debug;

/// New chain headers from a `newHeads` subscription. An `Err` item is fatal
/// for the subscription.
///
/// Dropping the stream only stops reading it; [`HeaderStream::close`] also
/// cancels the subscription on the node.
pub struct HeaderStream {
    headers: BoxStream<'static, Result<Header, ChainError>>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl HeaderStream {
    pub fn new(headers: BoxStream<'static, Result<Header, ChainError>>) -> Self {
        Self {
            headers,
            unsubscribe: None,
        }
    }

    /// Run `unsubscribe` when the stream is closed.
    pub fn on_close(mut self, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        self.unsubscribe = Some(Box::new(unsubscribe));
        self
    }

    pub async fn next(&mut self) -> Option<Result<Header, ChainError>> {
        self.headers.next().await
    }

    pub fn close(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for HeaderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderStream")
            .field("closable", &self.unsubscribe.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC transport error")]
    Transport(#[from] TransportError),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Receipt for transaction {0} not found")]
    ReceiptNotFound(B256),

    #[error("Header subscription failed: {0}")]
    Subscription(String),
}

/// Read access to an execution client.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Number of the current chain head.
    async fn head_number(&self) -> Result<u64, ChainError>;

    /// Fetch a block with full transaction bodies.
    async fn block_by_number(&self, number: u64) -> Result<RpcBlock, ChainError>;

    /// Logs emitted by a transaction, taken from its receipt.
    async fn receipt_logs(&self, tx_hash: B256) -> Result<Vec<Log>, ChainError>;

    /// Open a `newHeads` subscription. Callers close it with
    /// [`HeaderStream::close`] when they stop reading.
    async fn subscribe_headers(&self) -> Result<HeaderStream, ChainError>;
}

/// [`ChainClient`] backed by an alloy websocket provider.
#[derive(Clone, Debug)]
pub struct AlloyChainClient {
    provider: RootProvider,
}

impl AlloyChainClient {
    pub fn new(provider: RootProvider) -> Self {
        Self { provider }
    }

    /// Establish a websocket connection to the execution node.
    pub async fn connect_ws(ws_url: &str) -> Result<Self, ChainError> {
        let ws = WsConnect::new(ws_url);
        let provider = ProviderBuilder::new().connect_ws(ws).await?;
        Ok(Self::new(provider.root().clone()))
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn head_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_by_number(&self, number: u64) -> Result<RpcBlock, ChainError> {
        self.provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await?
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn receipt_logs(&self, tx_hash: B256) -> Result<Vec<Log>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or(ChainError::ReceiptNotFound(tx_hash))?;
        Ok(receipt.inner.logs().to_vec())
    }

    async fn subscribe_headers(&self) -> Result<HeaderStream, ChainError> {
        let subscription = self.provider.subscribe_blocks().await?;
        let id = *subscription.local_id();
        let provider = self.provider.clone();
        let headers = subscription.into_stream().map(Ok).boxed();
        Ok(HeaderStream::new(headers).on_close(move || {
            if let Err(err) = provider.unsubscribe(id) {
                debug!(error = %err, "failed to cancel header subscription");
            }
        }))
    }
}
