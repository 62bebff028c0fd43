//! Upload staging directory, owned temp artifacts with RAII cleanup, and
//! collision-safe destination naming.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const STAGING_PREFIX: &str = "lanshare_uploads_";
const ARTIFACT_RAND_BYTES: usize = 8;

/// Finds an available path by appending ` (N)` suffix if the target already exists.
/// Returns the original path unchanged if no collision.
/// Does not create any files; pure path resolution.
///
/// Note: Small TOCTOU window exists between this call and the move.
/// For a local file sharing tool this risk is acceptable.
pub fn find_available_path(mut path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let parent_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    // Hidden files keep their whole name as the base
    let (base_name, all_extensions) = match filename.find('.') {
        Some(dot_pos) if dot_pos > 0 => (
            filename[..dot_pos].to_string(),
            filename[dot_pos..].to_string(),
        ),
        _ => (filename, String::new()),
    };

    let (name_without_number, mut counter) = split_counter(&base_name);

    loop {
        let new_name = format!("{name_without_number} ({counter}){all_extensions}");
        path = parent_dir.join(&new_name);
        if !path.exists() {
            return path;
        }
        counter += 1;
    }
}

// "photo (3)" -> ("photo", 4); anything else -> (base, 1)
fn split_counter(base_name: &str) -> (String, u32) {
    if let Some(paren_pos) = base_name.rfind(" (") {
        if let Some(number) = base_name[paren_pos + 2..].strip_suffix(')') {
            if let Ok(num) = number.parse::<u32>() {
                return (base_name[..paren_pos].to_string(), num + 1);
            }
        }
    }
    (base_name.to_string(), 1)
}

/// Process-wide directory holding uploads until the operator decides.
///
/// Created once at startup. [`UploadStaging::close`] (or drop) removes it
/// together with every artifact still inside.
pub struct UploadStaging {
    dir: Option<TempDir>,
    area: StagingArea,
}

impl UploadStaging {
    /// Create the staging directory under the system temp dir.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir()
            .context("Failed to create upload staging directory")?;
        Ok(Self::from_dir(dir))
    }

    /// Create the staging directory under `parent`.
    pub fn new_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .with_context(|| {
                format!(
                    "Failed to create upload staging directory in {}",
                    parent.display()
                )
            })?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        let area = StagingArea {
            path: Arc::new(dir.path().to_path_buf()),
        };
        tracing::debug!(path = %area.path().display(), "staging directory created");
        Self {
            dir: Some(dir),
            area,
        }
    }

    pub fn path(&self) -> &Path {
        self.area.path()
    }

    /// Cloneable handle for the HTTP layer.
    pub fn area(&self) -> StagingArea {
        self.area.clone()
    }

    /// Remove the staging directory and everything left in it.
    pub fn close(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "staging directory removed"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove staging directory"
            ),
        }
    }

    /// Leave the staging directory on disk and return its path.
    pub fn keep(&mut self) -> PathBuf {
        match self.dir.take() {
            Some(dir) => dir.keep(),
            None => self.area.path().to_path_buf(),
        }
    }
}

impl Drop for UploadStaging {
    fn drop(&mut self) {
        self.close();
    }
}

/// Where uploads are written. Names are unique by construction.
#[derive(Debug, Clone)]
pub struct StagingArea {
    path: Arc<PathBuf>,
}

impl StagingArea {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocate a new empty artifact named `"{display_name}_XXXXXXXX"`.
    ///
    /// The random suffix comes from the filesystem-level unique-name
    /// primitive, so concurrent uploads of the same name never collide.
    pub fn allocate(&self, display_name: &str) -> io::Result<(File, TempArtifact)> {
        let named = tempfile::Builder::new()
            .prefix(&format!("{display_name}_"))
            .rand_bytes(ARTIFACT_RAND_BYTES)
            .tempfile_in(self.path.as_path())?;
        let (file, path) = named.keep().map_err(|e| e.error)?;
        Ok((file, TempArtifact::adopt(path)))
    }
}

/// A staged upload file owned by exactly one holder.
///
/// RAII: dropping an armed artifact deletes the file. [`TempArtifact::delete`]
/// consumes the guard, so a file is never deleted twice through it.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    disarmed: bool,
}

impl TempArtifact {
    /// Take ownership of an existing file.
    pub fn adopt(path: PathBuf) -> Self {
        Self {
            path,
            disarmed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Artifact file name; this is what transfers are keyed by.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Give up ownership without touching the file.
    pub fn into_path(mut self) -> PathBuf {
        self.disarmed = true;
        std::mem::take(&mut self.path)
    }

    /// Delete the file now. `Ok(false)` when it was already gone
    /// (for example, renamed away by the mover).
    pub fn delete(mut self) -> io::Result<bool> {
        self.disarmed = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.disarmed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up temporary file"
            ),
        }
    }
}
