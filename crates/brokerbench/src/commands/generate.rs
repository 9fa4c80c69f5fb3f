use std::path::PathBuf;

use libbrokerbench_core::{generate, Result};
use serde::Serialize;

use crate::cli::Cli;
use crate::commands::load_config;
use crate::output::output_success;

#[derive(Serialize)]
struct GenerateOutput {
    output_dir: String,
    total_transactions: u64,
    total_batches: u64,
    batch_size: u64,
}

pub fn run(cli: &Cli, count: u64, batch_size: u64, output_dir: Option<PathBuf>) -> Result<()> {
    let dir = match output_dir {
        Some(dir) => dir,
        None => load_config(cli)?.data_dir,
    };

    let manifest = generate(&dir, count, batch_size)?;

    let human = format!(
        "Generated {} transactions in {} batches in {}",
        manifest.total_transactions,
        manifest.total_batches,
        dir.display()
    );
    output_success(
        cli,
        GenerateOutput {
            output_dir: dir.display().to_string(),
            total_transactions: manifest.total_transactions,
            total_batches: manifest.total_batches,
            batch_size: manifest.batch_size,
        },
        &human,
    );
    Ok(())
}
