use libbrokerbench_core::Result;

use crate::cli::Cli;
use crate::commands::load_config;
use crate::output::output_success;

pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let toml = config.to_toml()?;
    output_success(cli, &config, toml.trim_end());
    Ok(())
}
