use crate::cli::Config;
use anyhow::{
    Context,
    Result,
};
use std::sync::Arc;
use tracing::info;
use window_core::{
    AlloyChainClient,
    ChainClient,
};
use window_ingest::{
    LocalTransport,
    Publisher,
    RedisTransport,
    Transport,
};
use window_store::{
    IndexedStore,
    KeyValueStore,
    MemoryStore,
    RedisStore,
};

/// Handles shared by every service, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    /// Present only when a selected service reads from the chain.
    pub chain: Option<Arc<dyn ChainClient>>,
    pub store: IndexedStore,
    pub transport: Arc<dyn Transport>,
    pub publisher: Arc<dyn Publisher>,
    /// The in-memory backend, when one is used, so expired entries can be
    /// swept.
    pub memory: Option<MemoryStore>,
    pub config: Config,
}

impl ServiceContext {
    /// Connect to the node (if needed) and set up the store and channel.
    pub async fn build(config: Config) -> Result<Self> {
        let chain: Option<Arc<dyn ChainClient>> = if config.needs_chain() {
            let ws_url = config
                .ws_url
                .as_deref()
                .context("--ws-url is required with --bootstrap or --pub")?;
            let client = AlloyChainClient::connect_ws(ws_url)
                .await
                .context("failed to connect to websocket provider")?;
            info!(ws_url, "connected to execution client");
            Some(Arc::new(client))
        } else {
            None
        };

        Self::with_chain(config, chain)
    }

    /// Assemble a context around an already connected chain client.
    pub fn with_chain(config: Config, chain: Option<Arc<dyn ChainClient>>) -> Result<Self> {
        let (kv, transport, publisher, memory): (
            Arc<dyn KeyValueStore>,
            Arc<dyn Transport>,
            Arc<dyn Publisher>,
            Option<MemoryStore>,
        ) = if config.in_memory {
            info!("using in-memory store and channel");
            let memory = MemoryStore::new();
            let transport = Arc::new(LocalTransport::new());
            (
                Arc::new(memory.clone()),
                transport.clone(),
                transport,
                Some(memory),
            )
        } else {
            let store =
                RedisStore::new(&config.redis_url).context("failed to initialize redis store")?;
            let transport = Arc::new(
                RedisTransport::new(&config.redis_url)
                    .context("failed to initialize redis pub/sub")?,
            );
            info!(redis_url = %config.redis_url, "using redis store and channel");
            (Arc::new(store), transport.clone(), transport, None)
        };

        Ok(Self {
            chain,
            store: IndexedStore::new(kv),
            transport,
            publisher,
            memory,
            config,
        })
    }

    /// The chain client, for services that cannot run without one.
    pub fn chain(&self) -> Result<Arc<dyn ChainClient>> {
        self.chain
            .clone()
            .context("service requires a chain client but none was configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn in_memory_context_needs_no_external_services() {
        let config = Config::try_parse_from(["block-window", "--sub", "--in-memory"]).unwrap();
        let ctx = ServiceContext::build(config).await.unwrap();

        assert!(ctx.chain.is_none());
        assert!(ctx.chain().is_err());
        assert!(ctx.memory.is_some());
        ctx.store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn redis_context_is_built_lazily() {
        // Nothing is contacted until the first command.
        let config = Config::try_parse_from([
            "block-window",
            "--api-server",
            "--redis-url",
            "redis://127.0.0.1:1",
        ])
        .unwrap();
        assert!(ServiceContext::build(config).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_redis_url_fails_startup() {
        let config =
            Config::try_parse_from(["block-window", "--sub", "--redis-url", "not-a-url"]).unwrap();
        assert!(ServiceContext::build(config).await.is_err());
    }
}
