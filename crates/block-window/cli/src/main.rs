//! `block-window`: keeps a short rolling window of recent blocks,
//! transactions and events in a key-value store and serves it over HTTP.
//!
//! Services are selected with flags and may be combined in one process:
//!
//! - `--bootstrap` writes the latest blocks once at startup
//! - `--pub` publishes a record for every new head
//! - `--sub` indexes published records
//! - `--api-server` serves lookups

mod cli;
mod context;
mod signal;
mod supervisor;

use crate::{
    cli::Config,
    context::ServiceContext,
    supervisor::Supervisor,
};

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use rust_tracing::trace;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // Install the shared tracing subscriber used across Credible services.
    let _guard = trace();

    let config = Config::parse();
    config.validate().context("invalid configuration")?;

    let ctx = ServiceContext::build(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = signal::cancel_on_signal(shutdown).await {
                warn!(error = ?err, "signal handling unavailable");
            }
        }
    });

    Supervisor::new(ctx, shutdown)
        .run()
        .await
        .context("block window terminated unexpectedly")
}
