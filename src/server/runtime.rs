//! Runtime lifecycle: bind, serve, readiness, and bounded shutdown.

use anyhow::{anyhow, Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::server::local::bind_listener;
use crate::server::state::ReadyGate;

// Extra time for the serve task to return after axum_server's own deadline
const JOIN_SLACK: Duration = Duration::from_secs(1);

/// A server that is accepting connections.
pub struct RunningServer {
    addr: SocketAddr,
    handle: axum_server::Handle,
    task: JoinHandle<std::io::Result<()>>,
    ready: ReadyGate,
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Bind `addr`, serve `app` in the background, and open `ready` once listening.
///
/// A bind failure is returned as an error and leaves the gate closed.
pub async fn start(app: Router, addr: SocketAddr, ready: ReadyGate) -> Result<RunningServer> {
    let listener = bind_listener(addr)?;

    let handle = axum_server::Handle::new();
    let mut task = tokio::spawn(
        axum_server::from_tcp(listener)
            .handle(handle.clone())
            .serve(app.into_make_service_with_connect_info::<SocketAddr>()),
    );

    let Some(bound) = handle.listening().await else {
        // Serve task ended before listening; surface its error
        let cause = match (&mut task).await {
            Ok(Err(e)) => anyhow::Error::new(e),
            Ok(Ok(())) => anyhow!("server exited immediately"),
            Err(e) => anyhow::Error::new(e),
        };
        return Err(cause.context(format!("Failed to start server on {addr}")));
    };

    ready.open();
    tracing::info!(addr = %bound, "Server started");

    Ok(RunningServer {
        addr: bound,
        handle,
        task,
        ready,
    })
}

impl RunningServer {
    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Refuse new uploads, stop accepting connections and wait up to `grace`
    /// for in-flight requests before the serve task is forced to end.
    pub async fn stop(mut self, grace: Duration) -> Result<()> {
        self.ready.close();
        self.handle.graceful_shutdown(Some(grace));
        tracing::info!(addr = %self.addr, "Server stopped accepting new connections");

        match tokio::time::timeout(grace + JOIN_SLACK, &mut self.task).await {
            Ok(joined) => {
                joined
                    .context("server task panicked")?
                    .context("server exited with an error")?;
                tracing::info!("Server shutdown complete");
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Server did not stop in time, forcing shutdown"
                );
                self.task.abort();
            }
        }
        Ok(())
    }
}
