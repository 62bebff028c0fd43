pub mod config;
pub mod config_commands;
pub mod errors;
pub mod events;
pub mod format;

pub use config::{AppConfig, CollisionPolicy};
pub use errors::{AppError, TransferError};
pub use events::{
    event_channel, notification_channel, sender_label, ControlEvent, EventReceiver, EventSender,
    LogLevel, NotificationReceiver, Notifier, Progress, TransferEvent, UploadReceipt,
};
pub use format::format_size;
