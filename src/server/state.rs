use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::common::EventSender;
use crate::receive::StagingArea;
use crate::send::ShareSnapshot;

/// Open only while the server is fully started; uploads are refused otherwise.
#[derive(Debug, Clone, Default)]
pub struct ReadyGate(Arc<AtomicBool>);

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the HTTP handlers may touch. Shares are read through the published
/// snapshot and uploads leave only through the event channel.
pub struct ServeInner {
    pub shares: watch::Receiver<ShareSnapshot>,
    pub events: EventSender,
    pub staging: StagingArea,
    pub ready: ReadyGate,
}

/// Shared state passed to every handler via the Axum State extractor.
#[derive(Clone)]
pub struct ServeState {
    inner: Arc<ServeInner>,
}

impl ServeState {
    pub fn new(
        shares: watch::Receiver<ShareSnapshot>,
        events: EventSender,
        staging: StagingArea,
        ready: ReadyGate,
    ) -> Self {
        Self {
            inner: Arc::new(ServeInner {
                shares,
                events,
                staging,
                ready,
            }),
        }
    }

    /// Snapshot current at the time of the call.
    pub fn shares(&self) -> ShareSnapshot {
        self.inner.shares.borrow().clone()
    }
}

impl Deref for ServeState {
    type Target = ServeInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
