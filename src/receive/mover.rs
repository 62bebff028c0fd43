//! Relocates accepted uploads from staging to their destination off the controller.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::common::{ControlEvent, EventSender, Progress};

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// One accepted transfer to relocate.
#[derive(Debug, Clone)]
pub struct MoveJob {
    pub pending_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Spawns one blocking worker per accepted transfer.
///
/// Workers report `progress(0/total)`, `progress(total/total)` and then a
/// result through the event channel. They never delete the staged file on
/// failure; that belongs to the store.
#[derive(Debug, Clone)]
pub struct TransferMover {
    events: EventSender,
}

impl TransferMover {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub fn spawn(&self, job: MoveJob) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || run_job(&events, job))
    }
}

fn run_job(events: &EventSender, job: MoveJob) {
    let MoveJob {
        pending_id,
        source,
        destination,
    } = job;

    tracing::debug!(
        %pending_id,
        source = %source.display(),
        destination = %destination.display(),
        "move started"
    );

    let outcome = move_file(&source, &destination, |bytes_done, bytes_total| {
        events.send(ControlEvent::MoverProgress(Progress {
            pending_id: pending_id.clone(),
            bytes_done,
            bytes_total,
        }));
    });

    let outcome = match outcome {
        Ok(()) => Ok(destination),
        Err(e) => {
            tracing::error!(%pending_id, error = %format!("{e:#}"), "move failed");
            Err(format!("{e:#}"))
        }
    };

    events.send(ControlEvent::MoverFinished {
        pending_id,
        outcome,
    });
}

/// Move `source` to `destination`, reporting `(bytes_done, bytes_total)`.
///
/// Renames when possible; any rename failure (typically a cross-device
/// move) falls back to copy-then-delete-source.
pub fn move_file(
    source: &Path,
    destination: &Path,
    mut report: impl FnMut(u64, u64),
) -> Result<()> {
    let total = fs::metadata(source)
        .with_context(|| format!("Failed to stat {}", source.display()))?
        .len();
    report(0, total);

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    if let Err(rename_err) = fs::rename(source, destination) {
        tracing::debug!(error = %rename_err, "rename failed, copying instead");
        copy_with_progress(source, destination, total, &mut report)?;
        if let Err(e) = fs::remove_file(source) {
            // The copy is complete; the store removes the leftover on release
            tracing::warn!(
                path = %source.display(),
                error = %e,
                "Failed to remove source after copy"
            );
        }
    }

    report(total, total);
    Ok(())
}

/// Chunked copy reporting progress strictly between 0 and `total`.
/// A partially written destination is removed on failure.
pub fn copy_with_progress(
    source: &Path,
    destination: &Path,
    total: u64,
    report: &mut impl FnMut(u64, u64),
) -> Result<u64> {
    let mut reader =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut writer = File::create(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let copied = (|| -> Result<u64> {
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut done = 0u64;
        loop {
            let n = reader.read(&mut buffer).context("read failed")?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).context("write failed")?;
            done += n as u64;
            if done < total {
                report(done, total);
            }
        }
        writer.sync_all().context("sync failed")?;
        Ok(done)
    })();

    if copied.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(destination) {
            tracing::warn!(
                path = %destination.display(),
                error = %e,
                "Failed to remove partial copy"
            );
        }
    }

    copied
}
