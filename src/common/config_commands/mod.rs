//! CLI handlers for config subcommands.

mod io;
mod reset;
mod show;

use crate::common::config::{config_path, AppConfig};
use anyhow::{Context, Result};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path() -> Result<()> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    show::write_path(&config_path(), &mut output)
}

/// Print the effective configuration after file and environment layers.
pub fn run_config_show() -> Result<()> {
    let config = crate::common::config::load_config()?;
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let stderr = std::io::stderr();
    let mut err_output = stderr.lock();
    show::write_effective(&config_path(), &config, &mut output, &mut err_output)
}

/// Reset config to defaults (with confirmation). True if the file was written.
pub fn run_config_reset(yes: bool) -> Result<bool> {
    reset::reset_config(&config_path(), yes)
}
