//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fleet Track - live vehicle telemetry over a STOMP broker
#[derive(Parser, Debug)]
#[command(
    name = "fleet-track",
    author,
    version,
    about = "Live vehicle telemetry tracking",
    long_about = "Subscribes to vehicle telemetry topics on a STOMP broker (SockJS / WebSocket),\n\
                  normalizes and throttles the stream, accumulates per-vehicle paths and \n\
                  reports statistics when stopped."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FLEET_TRACK_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FLEET_TRACK_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and track vehicles until stopped
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "FLEET_TRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker endpoint, overrides the file value.
    /// FLEET_STREAM_ENDPOINT is used when neither is set.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Vehicle to track (repeat for several)
    #[arg(long = "vehicle", value_name = "ID")]
    pub vehicles: Vec<String>,

    /// Track every vehicle on the shared topic
    #[arg(long, conflicts_with_all = ["vehicles", "multi"])]
    pub all: bool,

    /// Use the multi-vehicle stream even for a single vehicle
    #[arg(long)]
    pub multi: bool,

    /// Publish a data request for each tracked vehicle after connecting
    #[arg(long)]
    pub request: bool,

    /// Stop after this many seconds (0 = run until Ctrl+C)
    #[arg(long, default_value = "0", env = "FLEET_TRACK_DURATION")]
    pub duration: u64,

    /// Override the per-vehicle throttle interval
    #[arg(long, value_name = "MS")]
    pub throttle_ms: Option<u64>,

    /// Override the maximum path length
    #[arg(long)]
    pub max_path: Option<usize>,

    /// Enable reconnect with the default backoff when the file has none
    #[arg(long)]
    pub reconnect: bool,

    /// Log protocol-level frames
    #[arg(long)]
    pub debug: bool,

    /// Keep the map centred on this vehicle
    #[arg(long, value_name = "ID")]
    pub follow: Option<String>,

    /// Map refresh interval
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub render_interval_ms: u64,

    /// Use an in-memory broker fed with synthetic telemetry
    #[arg(long)]
    pub mock: bool,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FLEET_TRACK_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "fleet.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "fleet.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the topic each vehicle is subscribed on
    #[arg(long)]
    pub topics: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
