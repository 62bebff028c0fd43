//! Typed event channel between background producers, the controller and observers.
//!
//! Producers (upload handler, movers) hold an [`EventSender`] and never touch
//! controller state directly. Everything goes through one FIFO channel, so the
//! events of a given transfer are applied in the order they were emitted.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::mpsc;

/// Severity attached to operator-facing log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Bytes moved so far for one accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub pending_id: String,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return 100;
        }
        ((self.bytes_done.min(self.bytes_total) * 100) / self.bytes_total) as u8
    }
}

/// An upload persisted to staging, waiting to be registered.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub original_filename: String,
    pub temp_path: PathBuf,
    pub size_bytes: u64,
    pub sender: String,
}

/// Events produced off the controller task.
#[derive(Debug)]
pub enum ControlEvent {
    UploadReceived(UploadReceipt),
    MoverProgress(Progress),
    MoverFinished {
        pending_id: String,
        outcome: Result<PathBuf, String>,
    },
    Log {
        message: String,
        level: LogLevel,
    },
}

/// Notifications the controller delivers to observers (console, GUI, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    IncomingFile {
        pending_id: String,
        filename: String,
        size_bytes: u64,
        sender: String,
    },
    TransferProgress(Progress),
    TransferFinished {
        pending_id: String,
        success: bool,
        path_or_error: String,
    },
    LogMessage {
        text: String,
        level: LogLevel,
    },
}

/// Cloneable handle for producers; sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

pub type EventReceiver = mpsc::UnboundedReceiver<ControlEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Queue an event for the controller. Returns false once the controller is gone.
    pub fn send(&self, event: ControlEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(?event, "controller gone, dropping event");
                false
            }
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        self.send(ControlEvent::Log {
            message: message.into(),
            level,
        })
    }
}

/// Observer side of the controller: where [`TransferEvent`]s are delivered.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<TransferEvent>;

pub fn notification_channel() -> (Notifier, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, rx)
}

impl Notifier {
    pub fn notify(&self, event: TransferEvent) {
        // Observers are optional; a closed channel just means nobody is watching.
        let _ = self.tx.send(event);
    }

    /// Emit a tracing record and forward the line to observers.
    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            LogLevel::Debug => tracing::debug!("{text}"),
            LogLevel::Info => tracing::info!("{text}"),
            LogLevel::Warning => tracing::warn!("{text}"),
            LogLevel::Error => tracing::error!("{text}"),
        }
        self.notify(TransferEvent::LogMessage { text, level });
    }
}

/// Format a peer address the way it is shown to the operator.
pub fn sender_label(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
