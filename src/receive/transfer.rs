use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::Progress;
use crate::receive::storage::TempArtifact;

/// Lifecycle of an inbound upload.
///
/// `AwaitingConfirmation -> Accepting -> Moving -> Completed | Failed`, or
/// `AwaitingConfirmation -> Rejected`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    AwaitingConfirmation,
    Accepting,
    Moving,
    Completed,
    Failed,
    Rejected,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Failed | TransferState::Rejected
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One upload tracked by the store.
#[derive(Debug)]
pub struct IncomingTransfer {
    pub(crate) pending_id: String,
    pub(crate) original_filename: String,
    pub(crate) temp_path: PathBuf,
    pub(crate) size_bytes: u64,
    pub(crate) sender: String,
    pub(crate) state: TransferState,
    pub(crate) progress: Option<Progress>,
    pub(crate) destination: Option<PathBuf>,
    pub(crate) failure: Option<String>,
    // Some(_) until the transfer reaches a terminal state
    pub(crate) artifact: Option<TempArtifact>,
}

impl IncomingTransfer {
    pub fn pending_id(&self) -> &str {
        &self.pending_id
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Last reported mover progress; only set while moving.
    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the store still owns the staged file.
    pub fn owns_artifact(&self) -> bool {
        self.artifact.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::TransferState;

    #[test]
    fn only_final_states_are_terminal() {
        assert!(!TransferState::AwaitingConfirmation.is_terminal());
        assert!(!TransferState::Accepting.is_terminal());
        assert!(!TransferState::Moving.is_terminal());
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(TransferState::Rejected.is_terminal());
    }
}
