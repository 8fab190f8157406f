//! Turns SIGINT and SIGTERM into cancellation of the service token.

use anyhow::{
    Context,
    Result,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
///
/// Also returns once `shutdown` is cancelled by anything else, so the watcher
/// never outlives the services it stops.
pub async fn cancel_on_signal(shutdown: CancellationToken) -> Result<()> {
    tokio::select! {
        () = shutdown.cancelled() => return Ok(()),
        received = wait_for_signal() => {
            let signal = received?;
            info!(signal, "stopping services");
        }
    }
    shutdown.cancel();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{
        SignalKind,
        signal,
    };

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    Ok(tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    Ok("ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn watcher_ends_when_services_stop_on_their_own() {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn watcher_waits_while_nothing_happens() {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!watcher.is_finished());
        assert!(!shutdown.is_cancelled());
        watcher.abort();
    }
}
