//! Terminal feedback while the server comes up.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::server::share_url;

/// Spinner shown between launch and the first bind attempt.
pub struct StartupSpinner {
    bar: ProgressBar,
}

impl StartupSpinner {
    pub fn begin(shared: usize) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("Starting server with {shared} shared file(s)..."));
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn finish(self, started: &Result<SocketAddr>) {
        self.bar.finish_with_message(startup_message(started));
    }
}

/// Final spinner line: the share URL, or why binding failed.
pub fn startup_message(started: &Result<SocketAddr>) -> String {
    match started {
        Ok(addr) => format!(
            "{} Serving at {}",
            style("✓").green().bold(),
            share_url(*addr)
        ),
        Err(e) => format!(
            "{} Server not started: {e:#}",
            style("✗").red().bold()
        ),
    }
}
