//! Runs the selected services and coordinates their shutdown.
//!
//! Every service gets the same [`CancellationToken`]. Once it fires, the
//! supervisor waits up to the configured grace period for the services to
//! return and aborts whatever is still running after that.

use crate::context::ServiceContext;
use anyhow::{
    Context,
    Result,
    anyhow,
};
use std::{
    future::Future,
    time::Duration,
};
use tokio::{
    net::TcpListener,
    task::JoinSet,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};
use tracing::{
    error,
    info,
    warn,
};
use window_api::QueryService;
use window_ingest::{
    Bootstrapper,
    Indexer,
    Notifier,
};

type ServiceOutcome = (&'static str, Result<()>);

/// How often expired in-memory entries are evicted.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Supervisor {
    ctx: ServiceContext,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(ctx: ServiceContext, shutdown: CancellationToken) -> Self {
        Self { ctx, shutdown }
    }

    /// Start every selected service and return once they have all stopped.
    ///
    /// A service that fails outright cancels the others. The notifier and the
    /// indexer are restarted after their subscription fails instead.
    pub async fn run(self) -> Result<()> {
        let _sweeper = self.spawn_sweeper();
        let mut tasks = JoinSet::new();
        self.spawn_services(&mut tasks).await?;

        let mut failed = false;
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        info!("all services finished");
                        return Ok(());
                    };
                    if !record_outcome(joined) {
                        failed = true;
                        self.shutdown.cancel();
                        break;
                    }
                }
            }
        }

        let grace = self.ctx.config.shutdown_timeout();
        info!(grace_secs = grace.as_secs(), remaining = tasks.len(), "stopping services");
        if tokio::time::timeout(grace, drain(&mut tasks, &mut failed))
            .await
            .is_err()
        {
            error!(
                remaining = tasks.len(),
                "services failed to stop within the grace period, aborting"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(anyhow!("services failed to stop within {grace:?}"));
        }

        if failed {
            return Err(anyhow!("a service terminated with an error"));
        }
        info!("shutdown complete");
        Ok(())
    }

    /// Evict expired in-memory entries until the returned guard is dropped.
    /// The sweeper is not a service: it never keeps the process alive.
    fn spawn_sweeper(&self) -> Option<DropGuard> {
        let memory = self.ctx.memory.clone()?;
        let stop = self.shutdown.child_token();
        tokio::spawn({
            let stop = stop.clone();
            async move { memory.run_sweeper(SWEEP_INTERVAL, stop).await }
        });
        Some(stop.drop_guard())
    }

    async fn spawn_services(&self, tasks: &mut JoinSet<ServiceOutcome>) -> Result<()> {
        let config = &self.ctx.config;

        // The listener is bound before anything runs so a taken port fails
        // startup instead of a running service.
        let listener = if config.api_server {
            Some(
                TcpListener::bind(config.listen_addr)
                    .await
                    .with_context(|| format!("failed to bind {}", config.listen_addr))?,
            )
        } else {
            None
        };

        // Consumers are started ahead of producers.
        if config.subscribe {
            let indexer = Indexer::new(
                self.ctx.transport.clone(),
                self.ctx.store.clone(),
                config.pubsub_channel.clone(),
                config.key_expiry(),
            );
            let shutdown = self.shutdown.clone();
            let retry = config.subscription_retry();
            tasks.spawn(async move {
                let result = restart_on_failure("indexer", retry, shutdown.clone(), || {
                    indexer.run(shutdown.clone())
                })
                .await;
                ("indexer", result)
            });
        }

        if let Some(listener) = listener {
            let service = QueryService::new(self.ctx.store.clone());
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                let result = window_api::serve(listener, service, shutdown).await;
                ("api", result)
            });
        }

        if config.publish {
            let notifier = Notifier::new(
                self.ctx.chain()?,
                self.ctx.publisher.clone(),
                config.pubsub_channel.clone(),
            );
            let shutdown = self.shutdown.clone();
            let retry = config.subscription_retry();
            tasks.spawn(async move {
                let result = restart_on_failure("notifier", retry, shutdown.clone(), || {
                    notifier.run(shutdown.clone())
                })
                .await;
                ("notifier", result)
            });
        }

        if config.bootstrap {
            let bootstrapper = Bootstrapper::new(
                self.ctx.chain()?,
                self.ctx.store.clone(),
                config.bootstrap_config(),
            );
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                // A failed bootstrap leaves a shorter window; it is logged by the
                // bootstrapper and does not stop other services.
                let _ = bootstrapper.run(shutdown).await;
                ("bootstrap", Ok(()))
            });
        }

        Ok(())
    }
}

/// Run a service until it returns `Ok`, starting it again `retry` after every
/// failure. Returns `Ok` once `shutdown` fires.
async fn restart_on_failure<F, Fut, E>(
    service: &'static str,
    retry: Duration,
    shutdown: CancellationToken,
    mut start: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    loop {
        match start().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(
                    service,
                    error = ?err,
                    retry_secs = retry.as_secs(),
                    "service failed, restarting"
                );
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(retry) => {}
        }
    }
}

/// Log a finished service. Returns `false` if it failed.
fn record_outcome(joined: Result<ServiceOutcome, tokio::task::JoinError>) -> bool {
    match joined {
        Ok((service, Ok(()))) => {
            info!(service, "service finished");
            true
        }
        Ok((service, Err(err))) => {
            error!(service, error = ?err, "service terminated with an error");
            false
        }
        Err(err) => {
            error!(error = ?err, "service task panicked");
            false
        }
    }
}

async fn drain(tasks: &mut JoinSet<ServiceOutcome>, failed: &mut bool) {
    while let Some(joined) = tasks.join_next().await {
        if !record_outcome(joined) {
            *failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;
    use clap::Parser;
    use std::sync::Arc;
    use window_core::{
        ChainClient,
        test_utils::{
            MockChain,
            header,
            record,
        },
    };

    fn config(args: &[&str]) -> Config {
        let base = ["block-window", "--in-memory", "--ws-url", "ws://unused"];
        Config::try_parse_from(base.iter().chain(args.iter()).copied()).unwrap()
    }

    fn context(args: &[&str], chain: Arc<MockChain>) -> ServiceContext {
        let chain: Arc<dyn ChainClient> = chain;
        ServiceContext::with_chain(config(args), Some(chain)).unwrap()
    }

    #[tokio::test]
    async fn bootstrap_alone_exits_when_done() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_empty_blocks(0..=10);
        let ctx = context(&["--bootstrap", "--blocks-to-sync", "5"], chain);
        let store = ctx.store.clone();

        Supervisor::new(ctx, CancellationToken::new())
            .run()
            .await
            .unwrap();

        assert_eq!(
            store.list_block_numbers().await.unwrap(),
            (5..=10).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn failed_bootstrap_still_exits_cleanly() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_empty_blocks(0..=10);
        chain.fail_block(7);
        let ctx = context(&["--bootstrap", "--blocks-to-sync", "5"], chain);
        let store = ctx.store.clone();

        Supervisor::new(ctx, CancellationToken::new())
            .run()
            .await
            .unwrap();

        assert_eq!(store.list_block_numbers().await.unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn published_blocks_reach_the_store() {
        let chain = Arc::new(MockChain::new(1));
        chain.add_empty_blocks(1..=2);
        chain.script_headers(vec![Ok(header(1)), Ok(header(2))], true);
        let ctx = context(&["--pub", "--sub"], chain);
        let store = ctx.store.clone();
        let shutdown = CancellationToken::new();

        let watcher = tokio::spawn({
            let store = store.clone();
            let shutdown = shutdown.clone();
            async move {
                while store.get_block(2).await.unwrap().is_none() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                shutdown.cancel();
            }
        });

        Supervisor::new(ctx, shutdown).run().await.unwrap();
        watcher.await.unwrap();

        assert_eq!(store.list_block_numbers().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notifier_is_restarted() {
        let chain = Arc::new(MockChain::new(1));
        chain.script_headers(vec![Err("connection reset".to_owned())], false);
        let ctx = context(&["--pub", "--subscription-retry-secs", "5"], chain.clone());
        let shutdown = CancellationToken::new();

        let watcher = tokio::spawn({
            let chain = chain.clone();
            let shutdown = shutdown.clone();
            async move {
                while chain.subscriptions() < 3 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                shutdown.cancel();
            }
        });

        Supervisor::new(ctx, shutdown).run().await.unwrap();
        watcher.await.unwrap();
        assert!(chain.subscriptions() >= 3);
    }

    #[tokio::test]
    async fn api_stops_on_shutdown() {
        let ctx = context(
            &["--api-server", "--listen-addr", "127.0.0.1:0"],
            Arc::new(MockChain::new(0)),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        Supervisor::new(ctx, shutdown).run().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_is_bounded_by_the_grace_period() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async { ("finished", Ok(())) });
        tasks.spawn(async {
            std::future::pending::<()>().await;
            ("stuck", Ok(()))
        });

        let mut failed = false;
        let drained =
            tokio::time::timeout(Duration::from_secs(1), drain(&mut tasks, &mut failed)).await;

        assert!(drained.is_err());
        assert_eq!(tasks.len(), 1);
        assert!(!failed);
    }

    #[tokio::test]
    async fn notifier_without_chain_fails_startup() {
        let ctx = context(&["--pub"], Arc::new(MockChain::new(0)));
        let ctx = ServiceContext {
            chain: None,
            ..ctx
        };

        // The notifier cannot be built without a chain client.
        assert!(Supervisor::new(ctx, CancellationToken::new()).run().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_in_memory_entries_are_swept_while_services_run() {
        let ctx = context(
            &["--api-server", "--listen-addr", "127.0.0.1:0"],
            Arc::new(MockChain::new(0)),
        );
        let memory = ctx.memory.clone().unwrap();
        ctx.store
            .put_record(&record(1, Vec::new()), Duration::from_secs(1))
            .await
            .unwrap();
        let shutdown = CancellationToken::new();

        // Nothing reads the entry back; only the sweeper can evict it.
        let watcher = tokio::spawn({
            let memory = memory.clone();
            let shutdown = shutdown.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                let left_behind = memory.purge_expired();
                shutdown.cancel();
                left_behind
            }
        });

        Supervisor::new(ctx, shutdown).run().await.unwrap();
        assert_eq!(watcher.await.unwrap(), 0);
        assert!(memory.is_empty());
    }
}
