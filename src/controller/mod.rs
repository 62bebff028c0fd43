//! Single owner of the share registry and the transfer store.
//!
//! Everything that changes shared state arrives here, either as a
//! [`Command`] from the operator or as a [`ControlEvent`] from the HTTP
//! layer and movers, and is applied on one task in arrival order.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::sync::mpsc;

use crate::common::config::default_receiving_folder;
use crate::common::{
    event_channel, format_size, AppConfig, CollisionPolicy, ControlEvent, EventReceiver,
    EventSender, LogLevel, Notifier, TransferError, UploadReceipt,
};
use crate::receive::{
    find_available_path, IncomingTransferStore, TempArtifact, TransferMover, TransferState,
    UploadStaging,
};
use crate::send::ShareRegistry;
use crate::server::{self, ReadyGate, RunningServer, ServeState};

/// Where an accepted file should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationChoice {
    /// `receiving_folder/original_filename`, subject to the collision policy.
    Suggested,
    /// Explicit file path, or a directory to place the original name in.
    Path(PathBuf),
    /// The operator backed out before a destination was chosen.
    Cancelled,
}

/// Operator requests.
#[derive(Debug)]
pub enum Command {
    Share(PathBuf),
    ShareFolder(PathBuf),
    Unshare(Vec<PathBuf>),
    ClearShares,
    Status,
    Accept {
        pending_id: String,
        choice: DestinationChoice,
    },
    Reject(String),
    SetReceivingFolder(PathBuf),
    StartServer,
    StopServer,
    Shutdown,
}

pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

pub struct Controller {
    config: AppConfig,
    registry: ShareRegistry,
    store: IncomingTransferStore,
    staging: UploadStaging,
    receiving_folder: PathBuf,
    // used when `receiving_folder` is no longer a directory
    fallback_folder: PathBuf,
    events: EventSender,
    events_rx: EventReceiver,
    notifier: Notifier,
    ready: ReadyGate,
    server: Option<RunningServer>,
}

impl Controller {
    pub fn new(config: AppConfig, staging: UploadStaging, notifier: Notifier) -> Self {
        let (events, events_rx) = event_channel();
        let store = IncomingTransferStore::new(TransferMover::new(events.clone()), notifier.clone());
        let receiving_folder = config.receiving_folder();

        Self {
            config,
            registry: ShareRegistry::new(),
            store,
            staging,
            receiving_folder,
            fallback_folder: default_receiving_folder(),
            events,
            events_rx,
            notifier,
            ready: ReadyGate::new(),
            server: None,
        }
    }

    /// Folder to switch to when the receiving folder has gone away.
    pub fn with_fallback_folder(mut self, folder: PathBuf) -> Self {
        self.fallback_folder = folder;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShareRegistry {
        &self.registry
    }

    pub fn store(&self) -> &IncomingTransferStore {
        &self.store
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    pub fn receiving_folder(&self) -> &Path {
        &self.receiving_folder
    }

    /// Producer handle for code running off the controller task.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn ready_gate(&self) -> ReadyGate {
        self.ready.clone()
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(RunningServer::local_addr)
    }

    /// Handler state wired to this controller.
    pub fn serve_state(&self) -> ServeState {
        ServeState::new(
            self.registry.subscribe(),
            self.events.clone(),
            self.staging.area(),
            self.ready.clone(),
        )
    }

    pub fn router(&self) -> Router {
        server::create_router(&self.serve_state(), self.config.max_upload_bytes())
    }

    //-- EVENT LOOP

    /// Drive the controller until `Shutdown` arrives or every command sender
    /// is gone, then shut down.
    pub async fn run(mut self, mut commands: CommandReceiver) {
        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.apply_event(event),
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
        self.shutdown().await;
    }

    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Share(path) => {
                self.share(&path);
            }
            Command::ShareFolder(path) => {
                self.share_folder(&path);
            }
            Command::Unshare(paths) => {
                self.unshare(&paths);
            }
            Command::ClearShares => self.clear_shares(),
            Command::Status => self.status(),
            Command::Accept { pending_id, choice } => {
                let _ = self.accept(&pending_id, choice);
            }
            Command::Reject(pending_id) => {
                let _ = self.reject(&pending_id);
            }
            Command::SetReceivingFolder(path) => {
                self.set_receiving_folder(path);
            }
            Command::StartServer => {
                let _ = self.start_server().await;
            }
            Command::StopServer => self.stop_server().await,
            Command::Shutdown => {
                tracing::debug!("shutdown is handled by the run loop");
            }
        }
    }

    /// Apply one producer event to the registry/store.
    pub fn apply_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::UploadReceived(receipt) => self.register_upload(receipt),
            ControlEvent::MoverProgress(p) => {
                self.store
                    .on_mover_progress(&p.pending_id, p.bytes_done, p.bytes_total);
            }
            ControlEvent::MoverFinished {
                pending_id,
                outcome,
            } => {
                if let Err(e) = self.store.on_mover_result(&pending_id, outcome) {
                    self.notifier
                        .log(LogLevel::Error, format!("Ignoring mover result: {e}"));
                }
            }
            ControlEvent::Log { message, level } => self.notifier.log(level, message),
        }
    }

    /// Wait for the next producer event and apply it. False if none can arrive.
    pub async fn process_next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    fn register_upload(&mut self, receipt: UploadReceipt) {
        let UploadReceipt {
            original_filename,
            temp_path,
            size_bytes,
            sender,
        } = receipt;

        if let Err(e) = self
            .store
            .register(&original_filename, &temp_path, size_bytes, &sender)
        {
            self.notifier.log(
                LogLevel::Error,
                format!("Failed to register upload '{original_filename}': {e}"),
            );
            // Nobody else owns the staged file
            if let Err(e) = TempArtifact::adopt(temp_path).delete() {
                tracing::warn!(error = %e, "Failed to delete unregistered upload");
            }
        }
    }

    //-- SHARES

    pub fn share(&mut self, path: &Path) -> bool {
        let added = self.registry.add(path);
        if added {
            self.notifier
                .log(LogLevel::Info, format!("Added file: {}", path.display()));
        } else {
            self.notifier.log(
                LogLevel::Warning,
                format!(
                    "Not added (already shared or not a file): {}",
                    path.display()
                ),
            );
        }
        added
    }

    pub fn share_folder(&mut self, dir: &Path) -> usize {
        let added = self.registry.add_folder(dir);
        self.notifier.log(
            LogLevel::Info,
            format!("Added {added} file(s) from folder: {}", dir.display()),
        );
        added
    }

    pub fn unshare(&mut self, paths: &[PathBuf]) -> usize {
        let targets: HashSet<PathBuf> = paths.iter().cloned().collect();
        let removed = self.registry.remove(&targets);
        self.notifier
            .log(LogLevel::Info, format!("Removed {removed} shared file(s)"));
        removed
    }

    pub fn clear_shares(&mut self) {
        self.registry.clear();
        self.notifier.log(LogLevel::Info, "Cleared all shared files");
    }

    //-- INCOMING

    /// Resolve a destination and hand the transfer to a mover.
    ///
    /// Returns the chosen destination, or `None` when the operator cancelled
    /// (the transfer stays awaiting confirmation).
    pub fn accept(
        &mut self,
        pending_id: &str,
        choice: DestinationChoice,
    ) -> Result<Option<PathBuf>, TransferError> {
        let result = self.try_accept(pending_id, choice);
        if let Err(e) = &result {
            self.notifier
                .log(LogLevel::Warning, format!("Cannot accept {pending_id}: {e}"));
        }
        result
    }

    fn try_accept(
        &mut self,
        pending_id: &str,
        choice: DestinationChoice,
    ) -> Result<Option<PathBuf>, TransferError> {
        let transfer = self
            .store
            .get(pending_id)
            .ok_or_else(|| TransferError::NotFound(pending_id.to_string()))?;
        if transfer.state() != TransferState::AwaitingConfirmation {
            return Err(TransferError::InvalidState {
                pending_id: pending_id.to_string(),
                state: transfer.state(),
            });
        }
        let original = transfer.original_filename().to_string();

        let destination = match choice {
            DestinationChoice::Cancelled => {
                self.notifier.log(
                    LogLevel::Info,
                    format!("Accept cancelled for '{original}' (ID: {pending_id})"),
                );
                return Ok(None);
            }
            DestinationChoice::Suggested => self.suggested_destination(&original)?,
            DestinationChoice::Path(path) if path.is_dir() => path.join(&original),
            DestinationChoice::Path(path) => path,
        };

        self.store.begin_accept(pending_id, destination.clone())?;
        self.notifier.log(
            LogLevel::Info,
            format!(
                "Accepted '{original}', saving to {}",
                destination.display()
            ),
        );
        Ok(Some(destination))
    }

    fn suggested_destination(&mut self, original: &str) -> Result<PathBuf, TransferError> {
        if !self.receiving_folder.is_dir() {
            self.notifier.log(
                LogLevel::Warning,
                format!(
                    "Receiving folder {} is not a directory, switching to {}",
                    self.receiving_folder.display(),
                    self.fallback_folder.display()
                ),
            );
            self.receiving_folder = self.fallback_folder.clone();
        }
        let folder = self.receiving_folder.clone();
        std::fs::create_dir_all(&folder)?;

        let candidate = folder.join(original);
        Ok(match self.config.receive.collision {
            CollisionPolicy::Suffix => find_available_path(candidate),
            CollisionPolicy::Overwrite => candidate,
        })
    }

    pub fn reject(&mut self, pending_id: &str) -> Result<(), TransferError> {
        let result = self.store.reject(pending_id);
        if let Err(e) = &result {
            self.notifier
                .log(LogLevel::Warning, format!("Cannot reject {pending_id}: {e}"));
        }
        result
    }

    pub fn set_receiving_folder(&mut self, path: PathBuf) -> bool {
        if !path.is_dir() {
            self.notifier.log(
                LogLevel::Warning,
                format!("Not a directory: {}", path.display()),
            );
            return false;
        }
        self.notifier.log(
            LogLevel::Info,
            format!("Receiving folder set to: {}", path.display()),
        );
        self.receiving_folder = path;
        true
    }

    /// Log the shares and the transfers awaiting a decision.
    pub fn status(&self) {
        let server = match self.server_addr() {
            Some(addr) => format!("running at {}", server::share_url(addr)),
            None => "stopped".to_string(),
        };
        self.notifier
            .log(LogLevel::Info, format!("Server {server}"));
        self.notifier.log(
            LogLevel::Info,
            format!("Receiving folder: {}", self.receiving_folder.display()),
        );

        let shares = self.registry.snapshot();
        self.notifier
            .log(LogLevel::Info, format!("{} shared file(s)", shares.len()));
        for entry in shares.iter() {
            self.notifier.log(
                LogLevel::Info,
                format!(
                    "  [{}] {} ({})",
                    entry.id,
                    entry.name,
                    format_size(entry.size_bytes)
                ),
            );
        }

        for transfer in self.store.iter().filter(|t| !t.state().is_terminal()) {
            self.notifier.log(
                LogLevel::Info,
                format!(
                    "  {} '{}' ({}) from {}: {}",
                    transfer.pending_id(),
                    transfer.original_filename(),
                    format_size(transfer.size_bytes()),
                    transfer.sender(),
                    transfer.state()
                ),
            );
        }
    }

    //-- SERVER

    /// Start serving on the configured address. Bind failures are logged and
    /// returned; the controller keeps running either way.
    pub async fn start_server(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.server_addr() {
            self.notifier
                .log(LogLevel::Warning, "Server is already running");
            return Ok(addr);
        }

        let started = match self.config.bind_addr() {
            Ok(addr) => server::start(self.router(), addr, self.ready.clone()).await,
            Err(e) => Err(e),
        };

        match started {
            Ok(running) => {
                let addr = running.local_addr();
                self.server = Some(running);
                self.notifier.log(
                    LogLevel::Info,
                    format!("Server started at {}", server::share_url(addr)),
                );
                Ok(addr)
            }
            Err(e) => {
                self.notifier
                    .log(LogLevel::Error, format!("Failed to start server: {e:#}"));
                Err(e)
            }
        }
    }

    pub async fn stop_server(&mut self) {
        let Some(running) = self.server.take() else {
            self.notifier.log(LogLevel::Info, "Server is not running");
            return;
        };
        match running.stop(self.config.shutdown_grace()).await {
            Ok(()) => self.notifier.log(LogLevel::Info, "Server stopped"),
            Err(e) => self
                .notifier
                .log(LogLevel::Warning, format!("Server stopped with error: {e:#}")),
        }
    }

    /// Stop the server, let running moves finish, discard transfers still
    /// awaiting a decision and remove staging.
    pub async fn shutdown(mut self) {
        if self.server.is_some() {
            self.stop_server().await;
        }
        // Apply anything that finished while stopping
        self.drain_events();
        self.wait_for_movers(self.config.shutdown_grace()).await;

        let discarded = self.store.teardown();
        if discarded > 0 {
            self.notifier.log(
                LogLevel::Warning,
                format!("Discarded {discarded} unfinished transfer(s)"),
            );
        }

        let moving = self.store.moving_count();
        if moving > 0 {
            // The staged sources are still being read
            let kept = self.staging.keep();
            self.notifier.log(
                LogLevel::Warning,
                format!(
                    "{moving} move(s) still running, staging kept at {}",
                    kept.display()
                ),
            );
        } else {
            self.staging.close();
        }
        self.notifier.log(LogLevel::Info, "Shutdown complete");
    }

    /// Apply mover events until no transfer is moving or `grace` runs out.
    /// Returns how many moves were still running.
    pub async fn wait_for_movers(&mut self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        while self.store.moving_count() > 0 {
            match tokio::time::timeout_at(deadline, self.process_next_event()).await {
                Ok(true) => {}
                Ok(false) | Err(_) => break,
            }
        }
        self.store.moving_count()
    }
}
