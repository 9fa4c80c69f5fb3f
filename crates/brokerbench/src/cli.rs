use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "brokerbench", about = "Side-by-side Kafka vs RabbitMQ producer benchmark", version)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// TOML config file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (also BROKERBENCH_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the benchmark against every enabled broker
    Run(RunArgs),

    /// Generate synthetic transaction batches and a manifest
    Generate {
        /// Number of transactions
        #[arg(long, default_value = "10000")]
        count: u64,

        /// Transactions per batch file
        #[arg(long, default_value = "1000")]
        batch_size: u64,

        /// Output directory (defaults to the data directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// Test duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Pause between batches in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,

    /// CSV metrics log path
    #[arg(long)]
    pub metrics_log: Option<PathBuf>,

    /// Write a JSON report of the final metrics
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// fsync every metrics row
    #[arg(long)]
    pub fsync: bool,
}
