#![allow(dead_code)]

pub mod config_test_utils;
pub mod serve_http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use lanshare::common::{notification_channel, AppConfig, NotificationReceiver, TransferEvent};
use lanshare::controller::Controller;
use lanshare::receive::UploadStaging;
use tempfile::TempDir;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Controller with staging and receiving folder inside a private temp dir.
pub struct TestController {
    pub controller: Controller,
    pub notifications: NotificationReceiver,
    pub inbox: PathBuf,
    pub fallback: PathBuf,
    pub dir: TempDir,
}

pub fn test_config(inbox: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.shutdown_grace_secs = 1;
    config.receive.folder = Some(inbox.to_path_buf());
    config
}

pub fn test_controller() -> TestController {
    test_controller_with(|_| {})
}

pub fn test_controller_with(adjust: impl FnOnce(&mut AppConfig)) -> TestController {
    let dir = setup_temp_dir();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).expect("create inbox");
    let fallback = dir.path().join("fallback");

    let mut config = test_config(&inbox);
    adjust(&mut config);

    let staging = UploadStaging::new_in(dir.path()).expect("create staging");
    let (notifier, notifications) = notification_channel();
    TestController {
        controller: Controller::new(config, staging, notifier)
            .with_fallback_folder(fallback.clone()),
        notifications,
        inbox,
        fallback,
        dir,
    }
}

/// Write `len` bytes to a new file under `dir`.
pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![b'x'; len]).expect("write fixture file");
    path
}

/// Notifications received so far, without log lines.
pub fn transfer_events(rx: &mut NotificationReceiver) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if !matches!(event, TransferEvent::LogMessage { .. }) {
            events.push(event);
        }
    }
    events
}

/// Apply controller events until `done` holds or the timeout passes.
pub async fn pump_until(controller: &mut Controller, mut done: impl FnMut(&Controller) -> bool) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !done(controller) {
            controller.process_next_event().await;
        }
    })
    .await
    .expect("condition not reached before timeout");
}

pub fn staging_is_empty(controller: &Controller) -> bool {
    std::fs::read_dir(controller.staging_dir())
        .expect("read staging dir")
        .next()
        .is_none()
}
