use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lanshare::common::config::{apply_overrides, load_config, ConfigOverrides};
use lanshare::common::config_commands::{run_config_path, run_config_reset, run_config_show};
use lanshare::common::{notification_channel, LogLevel};
use lanshare::controller::{command_channel, Command, Controller};
use lanshare::output::StartupSpinner;
use lanshare::receive::UploadStaging;
use lanshare::ui::console;

#[derive(Parser)]
#[command(name = "lanshare", version)]
#[command(about = "Share files with peers on your local network")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve shared files and accept uploads
    Serve {
        /// Files or folders to share at startup
        files: Vec<PathBuf>,

        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind, e.g. 0.0.0.0 or 127.0.0.1
        #[arg(long)]
        host: Option<String>,

        /// Folder accepted uploads are saved to
        #[arg(long)]
        receive_dir: Option<PathBuf>,

        /// Run headless; uploads wait until the process exits
        #[arg(long)]
        no_console: bool,
    },
    /// Inspect or reset the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Overwrite the config file with defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn init_logging(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            files,
            port,
            host,
            receive_dir,
            no_console,
        } => {
            let overrides = ConfigOverrides {
                host,
                port,
                receive_dir,
            };
            serve(files, overrides, no_console).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => run_config_path(),
            ConfigAction::Show => run_config_show(),
            ConfigAction::Reset { yes } => run_config_reset(yes).map(|_| ()),
        },
    }
}

async fn serve(files: Vec<PathBuf>, overrides: ConfigOverrides, no_console: bool) -> Result<()> {
    // The console prints operator messages itself; keep tracing to warnings there
    init_logging(if no_console { "lanshare=info" } else { "lanshare=warn" });

    let config = apply_overrides(load_config()?, &overrides);
    config.validate()?;

    let staging = UploadStaging::new()?;
    let (notifier, notifications) = notification_channel();
    let printer = console::spawn_printer(notifications, LogLevel::Info);
    let mut controller = Controller::new(config, staging, notifier);

    for path in &files {
        if path.is_dir() {
            controller.share_folder(path);
        } else {
            controller.share(path);
        }
    }

    let starting = StartupSpinner::begin(controller.registry().len());
    // Keep running on failure; the operator can retry with `start`
    starting.finish(&controller.start_server().await);

    let (commands, commands_rx) = command_channel();

    let signal_commands = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - initiating graceful shutdown");
        let _ = signal_commands.send(Command::Shutdown);
    });

    if no_console {
        println!("Console disabled. Press Ctrl+C to stop.");
    } else {
        println!("{}", console::HELP);
        tokio::spawn(console::run(console::spawn_stdin_reader(), commands.clone()));
    }
    drop(commands);

    controller.run(commands_rx).await;
    printer.await.context("notification printer failed")?;

    Ok(())
}
