//! `config reset`: show which settings differ from the defaults, then
//! rewrite the file.

use super::defaults_toml;
use super::io::atomic_write;
use anyhow::{bail, Context, Result};
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use toml::{Table, Value};

pub(super) fn reset_config(path: &Path, yes: bool) -> Result<bool> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut output = stdout.lock();

    reset_config_with_io(path, yes, interactive, &mut input, &mut output)
}

/// `section.key: current -> default` for every setting in `current` that
/// the defaults disagree with. A file that is not valid TOML counts as one
/// drifted entry.
fn drifted_settings(current: &str, defaults: &Table) -> Vec<String> {
    let current: Table = match current.parse() {
        Ok(table) => table,
        Err(_) => return vec!["whole file: not valid TOML".to_string()],
    };

    let mut drift = Vec::new();
    for (section, value) in &current {
        let default_section = defaults.get(section).and_then(Value::as_table);
        match (value.as_table(), default_section) {
            (Some(keys), Some(default_keys)) => {
                for (key, value) in keys {
                    let default = default_keys.get(key);
                    if default != Some(value) {
                        drift.push(describe(&format!("{section}.{key}"), value, default));
                    }
                }
            }
            _ => {
                let default = defaults.get(section);
                if default != Some(value) {
                    drift.push(describe(section, value, default));
                }
            }
        }
    }
    drift
}

fn describe(key: &str, current: &Value, default: Option<&Value>) -> String {
    match default {
        Some(default) => format!("{key}: {current} -> {default}"),
        None => format!("{key}: {current} -> unset"),
    }
}

fn reset_config_with_io(
    path: &Path,
    yes: bool,
    interactive: bool,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<bool> {
    let defaults = defaults_toml()?;
    let current = match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    if let Some(current) = &current {
        let default_table: Table = defaults
            .parse()
            .context("Failed to parse default config")?;
        let drift = drifted_settings(current, &default_table);
        if drift.is_empty() {
            writeln!(output, "Config already matches defaults: {}", path.display())?;
            return Ok(false);
        }
        writeln!(output, "Settings that go back to their defaults:")?;
        for line in &drift {
            writeln!(output, "  {line}")?;
        }
    }

    if !yes {
        if !interactive {
            bail!("Refusing to reset config in non-interactive mode. Use --yes");
        }

        write!(output, "Write defaults to {}? [y/N]: ", path.display())?;
        output.flush()?;

        let mut response = String::new();
        input.read_line(&mut response)?;
        if !matches!(response.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            writeln!(output, "Reset cancelled.")?;
            return Ok(false);
        }
    }

    atomic_write(path, &defaults)?;
    writeln!(output, "Config reset to defaults: {}", path.display())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{defaults_toml, reset_config_with_io};
    use std::fs;
    use std::io::Cursor;

    fn run(path: &std::path::Path, yes: bool, interactive: bool, answer: &str) -> (bool, String) {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut output = Vec::new();
        let changed = reset_config_with_io(path, yes, interactive, &mut input, &mut output)
            .expect("reset should not error");
        (changed, String::from_utf8(output).expect("utf8"))
    }

    #[test]
    fn non_interactive_reset_requires_yes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 1234\n").expect("write config");

        let mut input = Cursor::new(Vec::<u8>::new());
        let mut output = Vec::new();
        let err = reset_config_with_io(&path, false, false, &mut input, &mut output)
            .expect_err("should fail without --yes");

        assert!(err.to_string().contains("Use --yes"));
        let content = fs::read_to_string(&path).expect("read config");
        assert!(content.contains("port = 1234"));
    }

    #[test]
    fn interactive_reset_honours_a_no() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 1234\n").expect("write config");

        let (changed, _) = run(&path, false, true, "n\n");

        assert!(!changed);
        assert!(fs::read_to_string(&path)
            .expect("read config")
            .contains("port = 1234"));
    }

    #[test]
    fn reset_lists_receive_settings_that_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[server]\nport = 8080\n\n[receive]\nfolder = \"/srv/inbox\"\ncollision = \"overwrite\"\n",
        )
        .expect("write config");

        let (changed, output) = run(&path, true, false, "");

        assert!(changed);
        assert!(output.contains("receive.folder: \"/srv/inbox\" -> unset"));
        assert!(output.contains("receive.collision: \"overwrite\" -> \"suffix\""));
        assert!(!output.contains("server.port"));
        let content = fs::read_to_string(&path).expect("read config");
        assert!(content.contains("collision = \"suffix\""));
        assert!(!content.contains("/srv/inbox"));
    }

    #[test]
    fn config_at_defaults_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, defaults_toml().expect("defaults")).expect("write config");

        let (changed, output) = run(&path, false, false, "");

        assert!(!changed);
        assert!(output.contains("already matches defaults"));
    }

    #[test]
    fn missing_file_is_written_with_yes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let (changed, _) = run(&path, true, false, "");

        assert!(changed);
        let content = fs::read_to_string(&path).expect("read config");
        assert!(content.contains("port = 8080"));
    }
}
