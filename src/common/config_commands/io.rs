//! File I/O helpers for safe config writes.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Replace `path` with `contents` via a synced sibling file and a rename.
pub(super) fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let tmp_path = sibling_temp_path(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write temporary file {}", tmp_path.display()))?;
    fs::File::open(&tmp_path)
        .and_then(|file| file.sync_all())
        .with_context(|| format!("Failed to sync temporary file {}", tmp_path.display()))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("Failed to replace {}", path.display()));
    }

    Ok(())
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let base_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("config.toml");
    path.with_file_name(format!(".{base_name}.{}.tmp", Uuid::new_v4()))
}
