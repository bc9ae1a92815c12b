//! Command-line argument parsing for pgbsync.
//!
//! This module handles parsing command-line arguments and determining
//! which CLI command to execute.

use std::path::PathBuf;

use crate::traits::ServiceAction;

/// Usage text for `--help` and usage errors.
pub const USAGE: &str = "\
Usage: pgbsync [OPTIONS] <COMMAND>

Commands:
  setup      Bootstrap the auth file and run a first full sync
  --daemon   Run the monitor loop until SIGINT/SIGTERM
  sync       Run exactly one sync cycle and exit
  start      Start the pgbsync service
  stop       Stop the pgbsync service
  restart    Restart the pgbsync service
  status     Show the pgbsync service status

Options:
  -c, --config <PATH>  Config file (default: /etc/pgbsync/config.json)
  -v, --verbose        Debug logging for pgbsync
  -V, --version        Print version
  -h, --help           Print help

Environment:
  PGBSYNC_BOOTSTRAP_PASSWORD  Plaintext password of the bootstrap role (setup)
  RUST_LOG                    Overrides the log filter
";

/// Parsed CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    /// One-time bootstrap
    Setup,
    /// Run the monitor loop
    Daemon,
    /// Run one cycle
    Sync,
    /// Lifecycle passthrough for the daemon's own unit
    Service(ServiceAction),
    /// Show version information
    Version,
    /// Show usage
    Help,
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: CliCommand,
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

/// Invalid command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
    #[error("{0} requires a value")]
    MissingValue(String),
    #[error("conflicting commands '{0}' and '{1}'")]
    ConflictingCommands(String, String),
    #[error("no command given")]
    NoCommand,
}

fn command_name(command: CliCommand) -> String {
    match command {
        CliCommand::Setup => "setup".to_string(),
        CliCommand::Daemon => "--daemon".to_string(),
        CliCommand::Sync => "sync".to_string(),
        CliCommand::Service(action) => action.to_string(),
        CliCommand::Version => "--version".to_string(),
        CliCommand::Help => "--help".to_string(),
    }
}

/// Parse command-line arguments.
///
/// `--version` and `--help` win over any other command so they always work.
///
/// # Examples
///
/// ```
/// use pgbsync::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["pgbsync".to_string(), "sync".to_string()];
/// assert_eq!(parse_args(args.into_iter()).unwrap().command, CliCommand::Sync);
/// ```
pub fn parse_args<I>(args: I) -> Result<CliArgs, ArgsError>
where
    I: Iterator<Item = String>,
{
    let mut command: Option<CliCommand> = None;
    let mut config_path = None;
    let mut verbose = false;
    let mut informational = None;

    // Skip the program name
    let mut args = args.skip(1);
    while let Some(arg) = args.next() {
        let parsed = match arg.as_str() {
            "--version" | "-V" => {
                informational.get_or_insert(CliCommand::Version);
                continue;
            }
            "--help" | "-h" => {
                informational.get_or_insert(CliCommand::Help);
                continue;
            }
            "--verbose" | "-v" => {
                verbose = true;
                continue;
            }
            "--config" | "-c" => {
                let value = args.next().ok_or_else(|| ArgsError::MissingValue(arg.clone()))?;
                config_path = Some(PathBuf::from(value));
                continue;
            }
            s if s.starts_with("--config=") => {
                config_path = Some(PathBuf::from(&s["--config=".len()..]));
                continue;
            }
            "setup" => CliCommand::Setup,
            "--daemon" | "daemon" => CliCommand::Daemon,
            "sync" => CliCommand::Sync,
            other => match ServiceAction::from_command(other) {
                Some(action) => CliCommand::Service(action),
                None => return Err(ArgsError::UnknownArgument(other.to_string())),
            },
        };

        if let Some(existing) = command {
            if existing != parsed {
                return Err(ArgsError::ConflictingCommands(
                    command_name(existing),
                    command_name(parsed),
                ));
            }
        }
        command = Some(parsed);
    }

    let command = match informational.or(command) {
        Some(command) => command,
        None => return Err(ArgsError::NoCommand),
    };

    Ok(CliArgs {
        command,
        config_path,
        verbose,
    })
}
