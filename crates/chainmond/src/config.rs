//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use chainmon_collector::PipelineConfig;
use chainmon_rpc::{ConnectionSettings, RetryPolicy};

/// When refresh passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RefreshMode {
    /// Refresh, sleep `--refresh-seconds`, repeat.
    Timer,
    /// Refresh on scrape, at most once per `--rate-limit-seconds`.
    Scrape,
}

#[derive(Debug, Parser)]
#[command(name = "chainmond", about = "Bitcoin daemon Prometheus exporter", version)]
pub struct Cli {
    /// RPC scheme.
    #[arg(long, env = "BITCOIN_RPC_SCHEME", default_value = "http")]
    pub rpc_scheme: String,

    /// RPC host.
    #[arg(long, env = "BITCOIN_RPC_HOST", default_value = "localhost")]
    pub rpc_host: String,

    /// RPC port.
    #[arg(long, env = "BITCOIN_RPC_PORT", default_value = "8332")]
    pub rpc_port: u16,

    /// RPC user. Used together with `--rpc-password`.
    #[arg(long, env = "BITCOIN_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "BITCOIN_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    /// Daemon config file to take credentials from. Wins over user/password.
    #[arg(long, env = "BITCOIN_CONF_PATH")]
    pub conf_path: Option<PathBuf>,

    /// Daemon data directory searched for `bitcoin.conf` and `.cookie`.
    #[arg(long, env = "BITCOIN_DATADIR")]
    pub datadir: Option<PathBuf>,

    /// Fee-estimate confirmation targets.
    #[arg(
        long,
        env = "SMARTFEE_BLOCKS",
        value_delimiter = ',',
        default_value = "2,3,5,20"
    )]
    pub smartfee_blocks: Vec<i64>,

    /// Hash-rate windows in blocks; -1 means since the last difficulty change.
    #[arg(
        long,
        env = "HASHPS_BLOCKS",
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_value = "-1,1,120"
    )]
    pub hashps_blocks: Vec<i64>,

    /// Address to serve metrics on.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0")]
    pub metrics_addr: IpAddr,

    /// Port to serve metrics on.
    #[arg(long, env = "METRICS_PORT", default_value = "8334")]
    pub metrics_port: u16,

    #[arg(long, env = "REFRESH_MODE", value_enum, default_value = "timer")]
    pub refresh_mode: RefreshMode,

    /// Seconds between passes in timer mode.
    #[arg(long, env = "REFRESH_SECONDS", default_value = "300")]
    pub refresh_seconds: u64,

    /// Minimum seconds between passes in scrape mode.
    #[arg(long, env = "RATE_LIMIT_SECONDS", default_value = "5")]
    pub rate_limit_seconds: u64,

    /// RPC timeout in seconds, retries included.
    #[arg(long, env = "TIMEOUT", default_value = "30")]
    pub timeout: u64,

    /// Log level or filter directive. `RUST_LOG` takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            scheme: self.rpc_scheme.clone(),
            host: self.rpc_host.clone(),
            port: self.rpc_port,
            user: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
            conf_path: self.conf_path.clone(),
            datadir: self.datadir.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.timeout())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            smart_fee_targets: self.smartfee_blocks.clone(),
            hashps_windows: self.hashps_blocks.clone(),
        }
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_addr, self.metrics_port)
    }

    /// Minimum time between passes for the configured mode.
    pub fn min_interval(&self) -> Duration {
        match self.refresh_mode {
            RefreshMode::Timer => Duration::ZERO,
            RefreshMode::Scrape => Duration::from_secs(self.rate_limit_seconds),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_seconds)
    }

    /// `RUST_LOG` when set, otherwise `--log-level`.
    pub fn log_filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.log_level.to_lowercase()),
        }
    }
}
