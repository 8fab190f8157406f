//! Command-line configuration for the block window.

use clap::Parser;
use std::{
    net::SocketAddr,
    time::Duration,
};
use window_ingest::BootstrapConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Write the latest blocks into the store once at startup.
    #[arg(long)]
    pub bootstrap: bool,

    /// Publish a record for every new chain head.
    #[arg(long = "pub")]
    pub publish: bool,

    /// Index published records into the store.
    #[arg(long = "sub")]
    pub subscribe: bool,

    /// Serve the query API.
    #[arg(long)]
    pub api_server: bool,

    /// Keep the store and the notification channel inside this process
    /// instead of Redis.
    #[arg(long, env = "BLOCK_WINDOW_IN_MEMORY")]
    pub in_memory: bool,

    #[arg(long, env = "BLOCK_WINDOW_WS_URL")]
    pub ws_url: Option<String>,

    #[arg(
        long,
        env = "BLOCK_WINDOW_REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    pub redis_url: String,

    #[arg(long, env = "BLOCK_WINDOW_PUBSUB_CHANNEL", default_value = "blocks")]
    pub pubsub_channel: String,

    /// Retention of records written by the indexer.
    #[arg(long, env = "BLOCK_WINDOW_KEY_EXPIRY_SECS", default_value = "650")]
    pub key_expiry_secs: u64,

    /// Blocks behind head covered by the bootstrap.
    #[arg(long, env = "BLOCK_WINDOW_BLOCKS_TO_SYNC", default_value = "49")]
    pub blocks_to_sync: u64,

    #[arg(long, env = "BLOCK_WINDOW_AVG_BLOCK_TIME_SECS", default_value = "13")]
    pub avg_block_time_secs: u64,

    #[arg(long, env = "BLOCK_WINDOW_BOOTSTRAP_TIMEOUT_SECS", default_value = "300")]
    pub bootstrap_timeout_secs: u64,

    /// Time services get to stop after a shutdown signal.
    #[arg(long, env = "BLOCK_WINDOW_SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "BLOCK_WINDOW_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Delay before a failed notifier or indexer is started again.
    #[arg(long, env = "BLOCK_WINDOW_SUBSCRIPTION_RETRY_SECS", default_value = "5")]
    pub subscription_retry_secs: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no service selected, pass at least one of --bootstrap, --pub, --sub, --api-server")]
    NoService,

    #[error("--ws-url is required with --bootstrap or --pub")]
    MissingWsUrl,

    #[error("--{0} must be greater than zero")]
    Zero(&'static str),

    #[error("--pubsub-channel must not be empty")]
    EmptyChannel,
}

impl Config {
    /// Reject configurations no service can start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bootstrap || self.publish || self.subscribe || self.api_server) {
            return Err(ConfigError::NoService);
        }
        if self.needs_chain() && self.ws_url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingWsUrl);
        }
        for (flag, value) in [
            ("key-expiry-secs", self.key_expiry_secs),
            ("avg-block-time-secs", self.avg_block_time_secs),
            ("bootstrap-timeout-secs", self.bootstrap_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(flag));
            }
        }
        if self.pubsub_channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        Ok(())
    }

    /// Whether a selected service reads from the chain.
    pub fn needs_chain(&self) -> bool {
        self.bootstrap || self.publish
    }

    /// The bootstrapper is the only service, so the process ends with it.
    pub fn bootstrap_only(&self) -> bool {
        self.bootstrap && !(self.publish || self.subscribe || self.api_server)
    }

    pub fn key_expiry(&self) -> Duration {
        Duration::from_secs(self.key_expiry_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn subscription_retry(&self) -> Duration {
        Duration::from_secs(self.subscription_retry_secs)
    }

    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            blocks_to_sync: self.blocks_to_sync,
            avg_block_time: Duration::from_secs(self.avg_block_time_secs),
            deadline: Duration::from_secs(self.bootstrap_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("block-window").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_match_the_documented_window() {
        let config = parse(&["--sub"]);
        assert_eq!(config.key_expiry(), Duration::from_secs(650));
        assert_eq!(config.pubsub_channel, "blocks");
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(
            config.bootstrap_config(),
            BootstrapConfig {
                blocks_to_sync: 49,
                avg_block_time: Duration::from_secs(13),
                deadline: Duration::from_secs(300),
            }
        );
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.subscription_retry(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn service_flags_are_parsed() {
        let config = parse(&["--pub", "--sub", "--api-server", "--ws-url", "ws://node:8546"]);
        assert!(config.publish && config.subscribe && config.api_server);
        assert!(!config.bootstrap);
        assert!(config.validate().is_ok());
        assert!(!config.bootstrap_only());
        assert!(parse(&["--bootstrap", "--ws-url", "ws://node:8546"]).bootstrap_only());
    }

    #[test]
    fn at_least_one_service_is_required() {
        assert_eq!(parse(&[]).validate(), Err(ConfigError::NoService));
    }

    #[test]
    fn chain_services_require_a_ws_url() {
        assert_eq!(parse(&["--pub"]).validate(), Err(ConfigError::MissingWsUrl));
        assert_eq!(
            parse(&["--bootstrap", "--ws-url", ""]).validate(),
            Err(ConfigError::MissingWsUrl)
        );
        assert!(parse(&["--api-server"]).validate().is_ok());
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_eq!(
            parse(&["--sub", "--key-expiry-secs", "0"]).validate(),
            Err(ConfigError::Zero("key-expiry-secs"))
        );
        assert_eq!(
            parse(&["--bootstrap", "--ws-url", "ws://node", "--avg-block-time-secs", "0"])
                .validate(),
            Err(ConfigError::Zero("avg-block-time-secs"))
        );
    }

    #[test]
    fn empty_channel_is_rejected() {
        assert_eq!(
            parse(&["--sub", "--pubsub-channel", " "]).validate(),
            Err(ConfigError::EmptyChannel)
        );
    }
}
