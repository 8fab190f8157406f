//! Shared Redis container for tests that need a real server.
//!
//! One container is started per test binary and reused. Tests isolate
//! themselves by picking their own logical database with
//! [`SharedRedisContainer::database_url`].
#![allow(clippy::expect_used)]

use std::sync::Arc;
use testcontainers::{
    ContainerAsync,
    runners::AsyncRunner,
};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static REDIS_CONTAINER: OnceCell<Arc<SharedRedisContainer>> = OnceCell::const_new();

pub struct SharedRedisContainer {
    _container: ContainerAsync<Redis>,
    pub url: String,
}

impl SharedRedisContainer {
    async fn new() -> anyhow::Result<Self> {
        let container = Redis::default()
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start Redis container: {e}"))?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(6379).await?;
        let url = format!("redis://{host}:{port}");

        Self::wait_for_ready(&url).await?;

        Ok(Self {
            _container: container,
            url,
        })
    }

    async fn wait_for_ready(url: &str) -> anyhow::Result<()> {
        use tokio::time::{
            Duration,
            sleep,
        };

        for _ in 0..30 {
            match redis::Client::open(url).and_then(|client| client.get_connection()) {
                Ok(_) => return Ok(()),
                Err(err) if err.is_io_error() => sleep(Duration::from_millis(100)).await,
                Err(err) => return Err(anyhow::anyhow!("Redis connection error: {err}")),
            }
        }
        Err(anyhow::anyhow!(
            "Redis at {url} was not ready after 30 attempts (3s)"
        ))
    }

    /// URL selecting logical database `db` (0-15 on a default server).
    pub fn database_url(&self, db: u8) -> String {
        format!("{}/{db}", self.url)
    }
}

/// Get or start the shared Redis container.
pub async fn get_shared_redis() -> Arc<SharedRedisContainer> {
    REDIS_CONTAINER
        .get_or_init(|| {
            async {
                Arc::new(
                    SharedRedisContainer::new()
                        .await
                        .expect("Failed to initialize shared Redis container"),
                )
            }
        })
        .await
        .clone()
}
