//! Authoritative record of every inbound upload, from arrival to terminal state.
//!
//! Owned by the controller and mutated only from its task, so there is no
//! locking here. Each transfer holds its staged file as a [`TempArtifact`]
//! inside an `Option`; every terminal path `take()`s it and deletes it, which
//! is what makes the delete happen exactly once. A move still running at
//! teardown gets its artifact released instead, since the mover reads it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::{format_size, LogLevel, Notifier, Progress, TransferError, TransferEvent};
use crate::receive::mover::{MoveJob, TransferMover};
use crate::receive::storage::TempArtifact;
use crate::receive::transfer::{IncomingTransfer, TransferState};

pub const REJECTED_BY_USER: &str = "Rejected by user";
pub const DISCARDED_AT_SHUTDOWN: &str = "Discarded at shutdown";

/// Finished transfers kept for listings; older ones are forgotten.
pub const FINISHED_HISTORY: usize = 256;

pub struct IncomingTransferStore {
    transfers: HashMap<String, IncomingTransfer>,
    // registration order, for listings
    order: Vec<String>,
    mover: TransferMover,
    notifier: Notifier,
    history_limit: usize,
}

impl IncomingTransferStore {
    pub fn new(mover: TransferMover, notifier: Notifier) -> Self {
        Self {
            transfers: HashMap::new(),
            order: Vec::new(),
            mover,
            notifier,
            history_limit: FINISHED_HISTORY,
        }
    }

    /// Keep at most `limit` finished transfers around.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Track a staged upload as awaiting confirmation and announce it.
    ///
    /// The pending id is the artifact's file name, which the staging area
    /// made unique when it allocated the file.
    pub fn register(
        &mut self,
        original_filename: &str,
        temp_path: &Path,
        size_bytes: u64,
        sender: &str,
    ) -> Result<String, TransferError> {
        let registration_error = |reason: String| TransferError::Registration {
            path: temp_path.to_path_buf(),
            reason,
        };

        let metadata = std::fs::metadata(temp_path).map_err(|e| registration_error(e.to_string()))?;
        if !metadata.is_file() {
            return Err(registration_error("not a regular file".to_string()));
        }

        let pending_id = temp_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| registration_error("artifact name is not valid UTF-8".to_string()))?
            .to_string();
        if self.transfers.contains_key(&pending_id) {
            return Err(registration_error(format!(
                "pending id {pending_id} already registered"
            )));
        }

        let transfer = IncomingTransfer {
            pending_id: pending_id.clone(),
            original_filename: original_filename.to_string(),
            temp_path: temp_path.to_path_buf(),
            size_bytes,
            sender: sender.to_string(),
            state: TransferState::AwaitingConfirmation,
            progress: None,
            destination: None,
            failure: None,
            artifact: Some(TempArtifact::adopt(temp_path.to_path_buf())),
        };
        self.transfers.insert(pending_id.clone(), transfer);
        self.order.push(pending_id.clone());

        self.notifier.log(
            LogLevel::Info,
            format!(
                "Incoming file '{original_filename}' ({}) from {sender}. Pending ID: {pending_id}",
                format_size(size_bytes)
            ),
        );
        self.notifier.notify(TransferEvent::IncomingFile {
            pending_id: pending_id.clone(),
            filename: original_filename.to_string(),
            size_bytes,
            sender: sender.to_string(),
        });

        Ok(pending_id)
    }

    /// Start moving an awaiting transfer to `destination`.
    ///
    /// Exactly one mover is spawned per transfer; any later call sees
    /// `Moving` (or a terminal state) and fails with `InvalidState`.
    pub fn begin_accept(
        &mut self,
        pending_id: &str,
        destination: PathBuf,
    ) -> Result<(), TransferError> {
        let transfer = awaiting_mut(&mut self.transfers, pending_id)?;

        transfer.state = TransferState::Accepting;
        transfer.destination = Some(destination.clone());
        let job = MoveJob {
            pending_id: transfer.pending_id.clone(),
            source: transfer.temp_path.clone(),
            destination,
        };
        self.mover.spawn(job);
        transfer.state = TransferState::Moving;

        tracing::debug!(%pending_id, "transfer handed to mover");
        Ok(())
    }

    /// Discard an awaiting transfer and its staged file.
    pub fn reject(&mut self, pending_id: &str) -> Result<(), TransferError> {
        let transfer = awaiting_mut(&mut self.transfers, pending_id)?;

        transfer.state = TransferState::Rejected;
        transfer.failure = Some(REJECTED_BY_USER.to_string());
        let artifact = transfer.artifact.take();
        let filename = transfer.original_filename.clone();

        self.discard_artifact(pending_id, artifact);
        self.notifier.log(
            LogLevel::Info,
            format!("Rejected and deleted temp file for '{filename}' (ID: {pending_id})"),
        );
        self.notifier.notify(TransferEvent::TransferFinished {
            pending_id: pending_id.to_string(),
            success: false,
            path_or_error: REJECTED_BY_USER.to_string(),
        });
        self.prune_finished();
        Ok(())
    }

    /// Record mover progress. Ignored unless the transfer is moving.
    pub fn on_mover_progress(&mut self, pending_id: &str, bytes_done: u64, bytes_total: u64) -> bool {
        let Some(transfer) = self.transfers.get_mut(pending_id) else {
            tracing::warn!(%pending_id, "progress for unknown transfer ignored");
            return false;
        };
        if transfer.state != TransferState::Moving {
            tracing::warn!(%pending_id, state = %transfer.state, "progress outside of move ignored");
            return false;
        }

        let progress = Progress {
            pending_id: pending_id.to_string(),
            bytes_done: bytes_done.min(bytes_total),
            bytes_total,
        };
        transfer.progress = Some(progress.clone());
        self.notifier
            .notify(TransferEvent::TransferProgress(progress));
        true
    }

    /// Apply the mover's verdict and release the staged file.
    pub fn on_mover_result(
        &mut self,
        pending_id: &str,
        outcome: Result<PathBuf, String>,
    ) -> Result<(), TransferError> {
        let transfer = self
            .transfers
            .get_mut(pending_id)
            .ok_or_else(|| TransferError::NotFound(pending_id.to_string()))?;
        if transfer.state != TransferState::Moving {
            return Err(TransferError::InvalidState {
                pending_id: pending_id.to_string(),
                state: transfer.state,
            });
        }

        transfer.progress = None;
        let artifact = transfer.artifact.take();
        let filename = transfer.original_filename.clone();

        let event = match outcome {
            Ok(path) => {
                transfer.state = TransferState::Completed;
                transfer.destination = Some(path.clone());
                self.discard_artifact(pending_id, artifact);
                self.notifier.log(
                    LogLevel::Info,
                    format!("File '{filename}' received. Saved to: {}", path.display()),
                );
                TransferEvent::TransferFinished {
                    pending_id: pending_id.to_string(),
                    success: true,
                    path_or_error: path.display().to_string(),
                }
            }
            Err(message) => {
                transfer.state = TransferState::Failed;
                transfer.failure = Some(message.clone());
                self.discard_artifact(pending_id, artifact);
                self.notifier.log(
                    LogLevel::Error,
                    format!("Failed to receive '{filename}': {message}"),
                );
                TransferEvent::TransferFinished {
                    pending_id: pending_id.to_string(),
                    success: false,
                    path_or_error: message,
                }
            }
        };

        self.notifier.notify(event);
        self.prune_finished();
        Ok(())
    }

    /// Fail every transfer still awaiting a decision and delete its staged
    /// file. Returns how many transfers were discarded.
    ///
    /// Transfers already handed to a mover keep their state; their staged
    /// file is released to the mover, which still reads it.
    pub fn teardown(&mut self) -> usize {
        let mut discarded = 0;
        for pending_id in &self.order {
            let Some(transfer) = self.transfers.get_mut(pending_id) else {
                continue;
            };
            match transfer.state {
                TransferState::AwaitingConfirmation => {}
                TransferState::Accepting | TransferState::Moving => {
                    let _ = transfer.artifact.take().map(TempArtifact::into_path);
                    tracing::warn!(
                        %pending_id,
                        destination = ?transfer.destination,
                        "move still running at shutdown, leaving it to finish"
                    );
                    continue;
                }
                _ => continue,
            }

            transfer.state = TransferState::Failed;
            transfer.failure = Some(DISCARDED_AT_SHUTDOWN.to_string());
            transfer.progress = None;
            if let Some(artifact) = transfer.artifact.take() {
                if let Err(e) = artifact.delete() {
                    tracing::warn!(%pending_id, error = %e, "Failed to delete staged upload");
                }
            }
            self.notifier.notify(TransferEvent::TransferFinished {
                pending_id: pending_id.clone(),
                success: false,
                path_or_error: DISCARDED_AT_SHUTDOWN.to_string(),
            });
            discarded += 1;
        }

        if discarded > 0 {
            tracing::warn!(count = discarded, "discarded unfinished transfers at shutdown");
        }
        discarded
    }

    pub fn get(&self, pending_id: &str) -> Option<&IncomingTransfer> {
        self.transfers.get(pending_id)
    }

    /// All transfers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &IncomingTransfer> {
        self.order.iter().filter_map(|id| self.transfers.get(id))
    }

    /// Transfers still waiting for an accept/reject decision.
    pub fn pending(&self) -> impl Iterator<Item = &IncomingTransfer> {
        self.iter()
            .filter(|t| t.state == TransferState::AwaitingConfirmation)
    }

    /// Transfers not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.transfers
            .values()
            .filter(|t| !t.state.is_terminal())
            .count()
    }

    /// Transfers whose mover has not reported back yet.
    pub fn moving_count(&self) -> usize {
        self.transfers
            .values()
            .filter(|t| matches!(t.state, TransferState::Accepting | TransferState::Moving))
            .count()
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    // Drop the oldest finished transfers beyond the history limit
    fn prune_finished(&mut self) {
        let transfers = &mut self.transfers;
        let finished = self
            .order
            .iter()
            .filter(|id| transfers.get(*id).is_some_and(|t| t.state.is_terminal()))
            .count();
        let mut excess = finished.saturating_sub(self.history_limit);
        if excess == 0 {
            return;
        }

        self.order.retain(|id| {
            let finished = transfers.get(id).is_some_and(|t| t.state.is_terminal());
            if excess > 0 && finished {
                transfers.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn discard_artifact(&self, pending_id: &str, artifact: Option<TempArtifact>) {
        let Some(artifact) = artifact else {
            return;
        };
        let path = artifact.path().to_path_buf();
        match artifact.delete() {
            Ok(true) => self.notifier.log(
                LogLevel::Debug,
                format!("Cleaned temp file {} for {pending_id}", path.display()),
            ),
            Ok(false) => {}
            Err(e) => self.notifier.log(
                LogLevel::Warning,
                format!("Error removing temp file {}: {e}", path.display()),
            ),
        }
    }
}

// Lookup for operations only valid before a decision was made
fn awaiting_mut<'a>(
    transfers: &'a mut HashMap<String, IncomingTransfer>,
    pending_id: &str,
) -> Result<&'a mut IncomingTransfer, TransferError> {
    let transfer = transfers
        .get_mut(pending_id)
        .ok_or_else(|| TransferError::NotFound(pending_id.to_string()))?;
    if transfer.state != TransferState::AwaitingConfirmation {
        return Err(TransferError::InvalidState {
            pending_id: pending_id.to_string(),
            state: transfer.state,
        });
    }
    Ok(transfer)
}
