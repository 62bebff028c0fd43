pub mod handlers;
pub mod mover;
pub mod storage;
mod store;
mod transfer;

pub use mover::{MoveJob, TransferMover};
pub use storage::{find_available_path, StagingArea, TempArtifact, UploadStaging};
pub use store::{IncomingTransferStore, DISCARDED_AT_SHUTDOWN, REJECTED_BY_USER};
pub use transfer::{IncomingTransfer, TransferState};
