pub mod generate;
pub mod run;
pub mod show_config;

use libbrokerbench_core::{BenchConfig, Result};

use crate::cli::Cli;

/// Effective config: defaults, then --config, then the environment, then
/// global flags. Subcommands layer their own flags on top.
pub fn load_config(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    config.apply_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}
