//! Line-oriented operator console: commands in on stdin, notifications out on stdout.

use std::io::BufRead;
use std::path::PathBuf;

use console::style;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{format_size, LogLevel, NotificationReceiver, TransferEvent};
use crate::controller::{Command, CommandSender, DestinationChoice};

pub const HELP: &str = "\
Commands:
  share <path>          share one file
  share-dir <path>      share every file directly inside a folder
  unshare <path>...     stop sharing the given files (\"quote\" paths with spaces)
  clear                 stop sharing everything
  list                  show server, shares and pending transfers
  accept <id> [path]    accept an upload (asks for a destination if no path)
  reject <id>           reject an upload and delete it
  folder <path>         set the receiving folder
  start | stop          start or stop the server
  help                  show this help
  quit                  shut down";

const CANCEL_ANSWER: &str = "cancel";

/// One parsed console line.
#[derive(Debug)]
pub enum ConsoleInput {
    Command(Command),
    /// `accept <id>` without a path; the destination is asked for next.
    AcceptPrompt(String),
    Help,
    Quit,
    Empty,
}

/// Parse one line typed by the operator.
pub fn parse_line(line: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleInput::Empty);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "help" | "?" => return Ok(ConsoleInput::Help),
        "quit" | "exit" => return Ok(ConsoleInput::Quit),
        "share" => Command::Share(required_path(verb, rest)?),
        "share-dir" => Command::ShareFolder(required_path(verb, rest)?),
        "unshare" => {
            if rest.is_empty() {
                return Err("usage: unshare <path>...".to_string());
            }
            Command::Unshare(split_args(rest)?.into_iter().map(PathBuf::from).collect())
        }
        "clear" => Command::ClearShares,
        "list" | "status" => Command::Status,
        "accept" => {
            let (pending_id, path) = match rest.split_once(char::is_whitespace) {
                Some((id, path)) => (id, path.trim()),
                None => (rest, ""),
            };
            if pending_id.is_empty() {
                return Err("usage: accept <id> [path]".to_string());
            }
            if path.is_empty() {
                return Ok(ConsoleInput::AcceptPrompt(pending_id.to_string()));
            }
            Command::Accept {
                pending_id: pending_id.to_string(),
                choice: DestinationChoice::Path(PathBuf::from(path)),
            }
        }
        "reject" => {
            if rest.is_empty() {
                return Err("usage: reject <id>".to_string());
            }
            Command::Reject(rest.to_string())
        }
        "folder" => Command::SetReceivingFolder(required_path(verb, rest)?),
        "start" => Command::StartServer,
        "stop" => Command::StopServer,
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };
    Ok(ConsoleInput::Command(command))
}

fn required_path(verb: &str, rest: &str) -> Result<PathBuf, String> {
    if rest.is_empty() {
        return Err(format!("usage: {verb} <path>"));
    }
    Ok(PathBuf::from(rest))
}

/// Split on whitespace, keeping `"double quoted"` runs together.
fn split_args(rest: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in rest.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if started {
        args.push(current);
    }
    Ok(args)
}

/// Answer to the destination prompt: empty keeps the suggestion.
pub fn destination_from_answer(answer: &str) -> DestinationChoice {
    let answer = answer.trim();
    if answer.is_empty() {
        DestinationChoice::Suggested
    } else if answer.eq_ignore_ascii_case(CANCEL_ANSWER) {
        DestinationChoice::Cancelled
    } else {
        DestinationChoice::Path(PathBuf::from(answer))
    }
}

/// Read stdin on a dedicated thread; the channel closes at EOF.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Turn operator lines into controller commands until `quit` or EOF,
/// then request shutdown.
pub async fn run(mut lines: mpsc::UnboundedReceiver<String>, commands: CommandSender) {
    while let Some(line) = lines.recv().await {
        let command = match parse_line(&line) {
            Ok(ConsoleInput::Empty) => continue,
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::Help) => {
                println!("{HELP}");
                continue;
            }
            Ok(ConsoleInput::Command(command)) => command,
            Ok(ConsoleInput::AcceptPrompt(pending_id)) => {
                println!(
                    "Destination for {} (Enter = receiving folder, '{CANCEL_ANSWER}' to abort):",
                    style(&pending_id).cyan()
                );
                // EOF while asking counts as backing out
                let answer = lines.recv().await.unwrap_or_else(|| CANCEL_ANSWER.to_string());
                Command::Accept {
                    pending_id,
                    choice: destination_from_answer(&answer),
                }
            }
            Err(message) => {
                eprintln!("{}", style(message).red());
                continue;
            }
        };

        if commands.send(command).is_err() {
            return;
        }
    }

    let _ = commands.send(Command::Shutdown);
}

/// Render one notification, or `None` if it is below `min_level`.
pub fn render_event(event: &TransferEvent, min_level: LogLevel) -> Option<String> {
    let line = match event {
        TransferEvent::IncomingFile {
            pending_id,
            filename,
            size_bytes,
            sender,
        } => format!(
            "{} '{}' ({}) from {}\n  accept {} [path]  |  reject {}",
            style("Incoming").yellow().bold(),
            filename,
            format_size(*size_bytes),
            sender,
            style(pending_id).cyan(),
            style(pending_id).cyan(),
        ),
        TransferEvent::TransferProgress(progress) => format!(
            "  {} {:>3}% ({} / {})",
            style(&progress.pending_id).dim(),
            progress.percent(),
            format_size(progress.bytes_done),
            format_size(progress.bytes_total),
        ),
        TransferEvent::TransferFinished {
            pending_id,
            success: true,
            path_or_error,
        } => format!(
            "{} {} saved to {}",
            style("✓").green().bold(),
            pending_id,
            path_or_error
        ),
        TransferEvent::TransferFinished {
            pending_id,
            success: false,
            path_or_error,
        } => format!(
            "{} {}: {}",
            style("✗").red().bold(),
            pending_id,
            path_or_error
        ),
        TransferEvent::LogMessage { text, level } => {
            if *level < min_level {
                return None;
            }
            let tag = match level {
                LogLevel::Error => style(level.to_string()).red(),
                LogLevel::Warning => style(level.to_string()).yellow(),
                _ => style(level.to_string()).dim(),
            };
            format!("[{tag}] {text}")
        }
    };
    Some(line)
}

/// Print notifications until the controller drops its notifier.
pub fn spawn_printer(mut notifications: NotificationReceiver, min_level: LogLevel) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = notifications.recv().await {
            if let Some(line) = render_event(&event, min_level) {
                println!("{line}");
            }
        }
    })
}
