mod common;

use std::path::{Path, PathBuf};

use common::{setup_temp_dir, EVENT_TIMEOUT};
use lanshare::common::{
    event_channel, notification_channel, ControlEvent, EventReceiver, NotificationReceiver,
    Progress, TransferError, TransferEvent,
};
use lanshare::receive::{IncomingTransferStore, TransferMover, TransferState, UploadStaging};
use tempfile::TempDir;

struct Harness {
    store: IncomingTransferStore,
    events: EventReceiver,
    notifications: NotificationReceiver,
    staging: UploadStaging,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = setup_temp_dir();
    let (events_tx, events) = event_channel();
    let (notifier, notifications) = notification_channel();
    Harness {
        store: IncomingTransferStore::new(TransferMover::new(events_tx), notifier),
        events,
        notifications,
        staging: UploadStaging::new_in(dir.path()).expect("staging"),
        dir,
    }
}

impl Harness {
    /// Stage `len` bytes the way the upload handler does.
    fn stage(&self, name: &str, len: usize) -> PathBuf {
        let (file, artifact) = self.staging.area().allocate(name).expect("allocate");
        std::fs::write(artifact.path(), vec![b'z'; len]).expect("write staged");
        drop(file);
        artifact.into_path()
    }

    fn register(&mut self, name: &str, len: usize) -> (String, PathBuf) {
        let tmp = self.stage(name, len);
        let id = self
            .store
            .register(name, &tmp, len as u64, "10.0.0.5")
            .expect("register");
        (id, tmp)
    }

    /// Feed mover events back into the store until `pending_id` finishes.
    async fn run_mover(&mut self, pending_id: &str) {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                match self.events.recv().await.expect("event channel open") {
                    ControlEvent::MoverProgress(p) => {
                        self.store
                            .on_mover_progress(&p.pending_id, p.bytes_done, p.bytes_total);
                    }
                    ControlEvent::MoverFinished {
                        pending_id: id,
                        outcome,
                    } => {
                        self.store.on_mover_result(&id, outcome).expect("apply result");
                        if id == pending_id {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        })
        .await
        .expect("mover did not finish in time");
    }

    fn observed(&mut self) -> Vec<TransferEvent> {
        common::transfer_events(&mut self.notifications)
    }
}

fn dest(dir: &Path, name: &str) -> PathBuf {
    dir.join("dest").join(name)
}

#[tokio::test]
async fn register_starts_awaiting_confirmation() {
    let mut h = harness();
    let (id, tmp) = h.register("report.pdf", 1000);

    let transfer = h.store.get(&id).expect("registered");
    assert_eq!(transfer.state(), TransferState::AwaitingConfirmation);
    assert_eq!(transfer.original_filename(), "report.pdf");
    assert_eq!(transfer.size_bytes(), 1000);
    assert_eq!(transfer.temp_path(), tmp);
    assert!(id.starts_with("report.pdf_"));

    assert_eq!(
        h.observed(),
        vec![TransferEvent::IncomingFile {
            pending_id: id,
            filename: "report.pdf".into(),
            size_bytes: 1000,
            sender: "10.0.0.5".into(),
        }]
    );
}

#[tokio::test]
async fn accepted_transfer_completes_with_progress_and_cleanup() {
    let mut h = harness();
    let (id, tmp) = h.register("a.txt", 500);
    h.observed();
    let destination = dest(h.dir.path(), "a.txt");

    h.store.begin_accept(&id, destination.clone()).unwrap();
    h.run_mover(&id).await;

    assert_eq!(
        h.observed(),
        vec![
            TransferEvent::TransferProgress(Progress {
                pending_id: id.clone(),
                bytes_done: 0,
                bytes_total: 500,
            }),
            TransferEvent::TransferProgress(Progress {
                pending_id: id.clone(),
                bytes_done: 500,
                bytes_total: 500,
            }),
            TransferEvent::TransferFinished {
                pending_id: id.clone(),
                success: true,
                path_or_error: destination.display().to_string(),
            },
        ]
    );

    let transfer = h.store.get(&id).unwrap();
    assert_eq!(transfer.state(), TransferState::Completed);
    assert_eq!(transfer.destination(), Some(destination.as_path()));
    assert!(transfer.progress().is_none());
    assert!(!tmp.exists());
    assert_eq!(std::fs::metadata(&destination).unwrap().len(), 500);
}

#[tokio::test]
async fn rejected_transfer_deletes_temp_and_cannot_be_accepted() {
    let mut h = harness();
    let (id, tmp) = h.register("b.txt", 64);

    h.store.reject(&id).unwrap();

    assert!(!tmp.exists());
    assert_eq!(h.store.get(&id).unwrap().state(), TransferState::Rejected);
    let err = h
        .store
        .begin_accept(&id, dest(h.dir.path(), "b.txt"))
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::InvalidState {
            state: TransferState::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn second_accept_fails_and_only_one_mover_runs() {
    let mut h = harness();
    let (id, _tmp) = h.register("c.txt", 10);

    h.store.begin_accept(&id, dest(h.dir.path(), "c.txt")).unwrap();
    let second = h.store.begin_accept(&id, dest(h.dir.path(), "other.txt"));
    assert!(matches!(second, Err(TransferError::InvalidState { .. })));

    h.run_mover(&id).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.events.try_recv().is_err(), "no second mover events");
    assert!(!dest(h.dir.path(), "other.txt").exists());
    assert_eq!(h.store.get(&id).unwrap().state(), TransferState::Completed);
}

#[tokio::test]
async fn reject_after_accept_is_invalid() {
    let mut h = harness();
    let (id, _tmp) = h.register("d.txt", 10);
    h.store.begin_accept(&id, dest(h.dir.path(), "d.txt")).unwrap();

    assert!(matches!(
        h.store.reject(&id),
        Err(TransferError::InvalidState {
            state: TransferState::Moving,
            ..
        })
    ));
    h.run_mover(&id).await;
}

#[tokio::test]
async fn failed_move_ends_failed_without_leftovers() {
    let mut h = harness();
    let (id, tmp) = h.register("e.txt", 10);
    // A regular file where the parent directory should be
    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, b"not a dir").unwrap();

    h.store.begin_accept(&id, blocker.join("e.txt")).unwrap();
    h.run_mover(&id).await;

    let transfer = h.store.get(&id).unwrap();
    assert_eq!(transfer.state(), TransferState::Failed);
    assert!(transfer.failure().unwrap().contains("Failed to create directory"));
    assert!(!tmp.exists());
    assert!(h.observed().iter().any(|e| matches!(
        e,
        TransferEvent::TransferFinished { success: false, .. }
    )));
}

#[tokio::test]
async fn every_transfer_ends_terminal_with_temp_removed() {
    let mut h = harness();
    let (ok_id, ok_tmp) = h.register("ok.txt", 100);
    let (bad_id, bad_tmp) = h.register("bad.txt", 100);
    let (rej_id, rej_tmp) = h.register("rej.txt", 100);
    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    h.store.begin_accept(&ok_id, dest(h.dir.path(), "ok.txt")).unwrap();
    h.store.begin_accept(&bad_id, blocker.join("bad.txt")).unwrap();
    h.store.reject(&rej_id).unwrap();
    h.run_mover(&ok_id).await;
    if !h.store.get(&bad_id).unwrap().state().is_terminal() {
        h.run_mover(&bad_id).await;
    }

    assert_eq!(h.store.active_count(), 0);
    for transfer in h.store.iter() {
        assert!(transfer.state().is_terminal());
        assert!(!transfer.owns_artifact());
    }
    for tmp in [ok_tmp, bad_tmp, rej_tmp] {
        assert!(!tmp.exists(), "{} left behind", tmp.display());
    }

    let finished = h
        .observed()
        .into_iter()
        .filter(|e| matches!(e, TransferEvent::TransferFinished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn teardown_discards_pending_transfers() {
    let mut h = harness();
    let (_a, a_tmp) = h.register("a.bin", 5);
    let (_b, b_tmp) = h.register("b.bin", 5);
    assert_eq!(h.store.pending().count(), 2);

    assert_eq!(h.store.teardown(), 2);

    assert!(!a_tmp.exists() && !b_tmp.exists());
    assert_eq!(h.store.pending().count(), 0);
    assert_eq!(h.store.len(), 2);
}
