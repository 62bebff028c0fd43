use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::common::config::AppConfig;

pub(super) fn write_path(path: &Path, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "{}", path.display())?;
    Ok(())
}

/// Print the merged config as TOML; mention on stderr where it came from.
pub(super) fn write_effective(
    path: &Path,
    config: &AppConfig,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if path.exists() {
        writeln!(stderr, "# loaded from {}", path.display())?;
    } else {
        writeln!(
            stderr,
            "# no config file at {}, showing defaults plus environment",
            path.display()
        )?;
    }

    let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
    stdout.write_all(text.as_bytes())?;
    writeln!(
        stdout,
        "# receiving folder in use: {}",
        config.receiving_folder().display()
    )?;
    Ok(())
}
