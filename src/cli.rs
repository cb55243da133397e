//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, inspect, health), and their associated argument
//! structs. Every flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::balance::Algorithm;
use crate::config::model::DEFAULT_POOLS_ROOT;

#[derive(Parser)]
#[command(
    name = "poolroute",
    version,
    about = "Load-balancing reverse proxy with lazily built pools",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        poolroute run --default-pool web        Serve pool 'web' from ./poolroute.yaml\n  \
        poolroute inspect web                   Show what pool 'web' would load\n  \
        poolroute health                        Query a running node"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Read pools from the config store and report what a build would load
    Inspect(InspectArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

/// Where pool configuration is read from.
#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Config store file (.yaml, .json, .toml)
    #[arg(short = 'f', long, env = "STORE_FILE")]
    pub store_file: Option<PathBuf>,

    /// Redis connection URL (primary store; the file becomes a fallback)
    #[cfg(feature = "redis")]
    #[arg(long, env = "REDIS_URL", help_heading = "Config Store")]
    pub redis_url: Option<String>,

    /// Key prefix under which pools live
    #[arg(long, env = "POOLS_ROOT", default_value = DEFAULT_POOLS_ROOT)]
    pub pools_root: String,

    /// Algorithm for pools that do not set `loadbalance`
    #[arg(long, env = "DEFAULT_ALGORITHM", default_value = "round_robin", value_parser = parse_algorithm)]
    pub default_algorithm: Algorithm,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        poolroute run --default-pool web                        Auto-detect store file\n  \
        poolroute run -f pools.yaml --vhost shop.io=checkout    Host-based dispatch\n  \
        poolroute run --redis-url redis://cache:6379 --pretty   Redis store, local dev")]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Dispatch --
    /// Map a Host header to a pool (host=pool, repeatable)
    #[arg(
        long = "vhost",
        env = "VHOSTS",
        value_delimiter = ',',
        help_heading = "Dispatch"
    )]
    pub vhosts: Vec<String>,

    /// Pool for hosts without a mapping
    #[arg(long, env = "DEFAULT_POOL", help_heading = "Dispatch")]
    pub default_pool: Option<String>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Upstream request timeout in milliseconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help_heading = "Tuning"
    )]
    pub timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Concurrent requests allowed per upstream target
    #[arg(
        long,
        env = "CONNECTIONS_PER_HOST",
        default_value_t = 2000,
        help_heading = "Tuning"
    )]
    pub connections_per_host: usize,

    /// Seconds between pool refreshes from the store (0 disables)
    #[arg(
        long,
        env = "REFRESH_INTERVAL_SECS",
        default_value_t = 30,
        help_heading = "Tuning"
    )]
    pub refresh_interval: u64,

    /// Do not add X-Forwarded-*, Via and correlation headers
    #[arg(long, help_heading = "Tuning")]
    pub no_proxy_headers: bool,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        poolroute inspect checkout                    Auto-detect store file\n  \
        poolroute inspect -f pools.toml web api       Several pools\n  \
        poolroute inspect checkout --format json      Machine-readable")]
pub struct InspectArgs {
    /// Pool names to inspect
    #[arg(required = true)]
    pub pools: Vec<String>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_algorithm(value: &str) -> Result<Algorithm, String> {
    value.parse::<Algorithm>().map_err(|e| e.to_string())
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
