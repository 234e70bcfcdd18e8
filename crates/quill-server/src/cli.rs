//! Administrative command table and argument handling.

use crate::App;
use clap::{Arg, Command};
use futures_util::future::BoxFuture;
use quill_db::{DbError, RequestScope};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Config file used when neither `--config` nor `QUILL_CONFIG_PATH` is set.
pub const DEFAULT_CONFIG_PATH: &str = "quill.toml";

/// Future returned by a command handler.
pub type CommandFuture = BoxFuture<'static, Result<(), CommandError>>;

/// A command handler. It runs inside its own [`RequestScope`], which is torn
/// down after the handler finishes.
pub type CommandHandler = Arc<dyn Fn(Arc<App>, RequestScope) -> CommandFuture + Send + Sync>;

/// Errors produced while dispatching or running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command line did not parse (this includes `--help`).
    #[error(transparent)]
    Usage(#[from] clap::Error),

    /// No handler is registered under the requested name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct CommandEntry {
    name: &'static str,
    about: &'static str,
    handler: CommandHandler,
}

/// Commands registered with the application, in registration order.
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing an earlier registration.
    pub fn add(&mut self, name: &'static str, about: &'static str, handler: CommandHandler) {
        let entry = CommandEntry {
            name,
            about,
            handler,
        };
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// The handler registered under `name`.
    pub fn handler(&self, name: &str) -> Option<&CommandHandler> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.handler)
    }

    /// Registered command names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Builds the `clap` parser for the registered commands.
    pub fn cli(&self) -> Command {
        let root = Command::new("quill")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Quill blog server")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("PATH")
                    .global(true)
                    .help("Path to the TOML config file"),
            );

        self.entries.iter().fold(root, |cmd, entry| {
            cmd.subcommand(Command::new(entry.name).about(entry.about))
        })
    }
}

/// Picks the config file: `--config`/`-c` on the command line, then the
/// `QUILL_CONFIG_PATH` environment variable, then [`DEFAULT_CONFIG_PATH`].
///
/// Returns the path and where it came from. Arguments are scanned by hand
/// because the full parser depends on the app, which depends on the config.
pub fn resolve_config_path(args: &[String]) -> (PathBuf, &'static str) {
    if let Some(path) = config_arg(args) {
        return (PathBuf::from(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("QUILL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (PathBuf::from(path), "env-var");
        }
    }

    (PathBuf::from(DEFAULT_CONFIG_PATH), "default")
}

fn config_arg(args: &[String]) -> Option<&str> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--config=") {
            return Some(value).filter(|v| !v.trim().is_empty());
        }
        if arg == "--config" || arg == "-c" {
            return iter
                .next()
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty());
        }
    }
    None
}
