//! Files offered for download, published to the HTTP layer as snapshots.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// One downloadable file. `id` is its index in the snapshot it came from and
/// is only valid until the registry changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareEntry {
    pub id: usize,
    pub name: String,
    pub size_bytes: u64,
    pub source_path: PathBuf,
}

pub type ShareSnapshot = Arc<[ShareEntry]>;

/// Outbound shares, deduplicated by absolute path.
///
/// Owned by the controller. Every mutation rebuilds the entry ids and
/// publishes a fresh snapshot through a `watch` channel.
pub struct ShareRegistry {
    entries: Vec<ShareEntry>,
    tx: watch::Sender<ShareSnapshot>,
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShareSnapshot::from(Vec::new()));
        Self {
            entries: Vec::new(),
            tx,
        }
    }

    /// Share one regular file. False if it is already shared or unusable.
    pub fn add(&mut self, path: &Path) -> bool {
        let path = absolute(path);
        if self.contains(&path) {
            tracing::warn!(path = %path.display(), "File is already shared");
            return false;
        }

        let metadata = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Not a regular file, skipping");
                return false;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot share file");
                return false;
            }
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        tracing::info!(%name, size = metadata.len(), "file shared");
        self.entries.push(ShareEntry {
            id: self.entries.len(),
            name,
            size_bytes: metadata.len(),
            source_path: path,
        });
        self.publish();
        true
    }

    /// Share the regular files directly inside `dir`, in name order.
    /// Returns how many were newly added.
    pub fn add_folder(&mut self, dir: &Path) -> usize {
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Cannot read folder");
                return 0;
            }
        };

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        files.sort();

        files.iter().filter(|path| self.add(path)).count()
    }

    /// Drop every entry whose path is in `paths`. Unknown paths are ignored.
    pub fn remove(&mut self, paths: &HashSet<PathBuf>) -> usize {
        let targets: HashSet<PathBuf> = paths.iter().map(|p| absolute(p)).collect();
        let before = self.entries.len();
        self.entries.retain(|e| !targets.contains(&e.source_path));
        let removed = before - self.entries.len();

        if removed > 0 {
            tracing::info!(count = removed, "shares removed");
            self.publish();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.publish();
    }

    pub fn snapshot(&self) -> ShareSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver for the serving layer; sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ShareSnapshot> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let path = absolute(path);
        self.entries.iter().any(|e| e.source_path == path)
    }

    fn publish(&mut self) {
        for (id, entry) in self.entries.iter_mut().enumerate() {
            entry.id = id;
        }
        self.tx.send_replace(ShareSnapshot::from(self.entries.clone()));
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
