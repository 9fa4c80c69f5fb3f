//! brokerbench - side-by-side producer benchmark for Kafka and RabbitMQ
//!
//! Replays pre-generated transaction batches against every enabled broker for
//! a fixed duration and records per-broker throughput, latency and process
//! resource usage to a CSV log.

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so --json output on stdout stays parseable
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Command::Run(args) => commands::run::run(&cli, args).await,
        Command::Generate {
            count,
            batch_size,
            output_dir,
        } => commands::generate::run(&cli, *count, *batch_size, output_dir.clone()),
        Command::ShowConfig => commands::show_config::run(&cli),
    };

    if let Err(e) = result {
        output::output_error(&cli, &e);
        std::process::exit(e.exit_code());
    }
}
