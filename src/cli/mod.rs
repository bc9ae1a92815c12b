//! CLI module for pgbsync.
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing
//! - One-time bootstrap (`setup`)
//! - The monitor daemon (`--daemon`) and one-shot `sync`
//! - Service lifecycle passthrough (`start`, `stop`, `restart`, `status`)
//!
//! # Usage
//!
//! ```ignore
//! use pgbsync::cli::{parse_args, run_cli_command, Services};
//!
//! let args = parse_args(std::env::args())?;
//! let services = Services::from_config(&config)?;
//! let code = run_cli_command(args.command, &config, &services).await;
//! ```

pub mod args;
pub mod daemon;
pub mod service;
pub mod setup;
pub mod sync;

pub use args::{parse_args, ArgsError, CliArgs, CliCommand, USAGE};
pub use daemon::{handle_daemon_command, shutdown_signal};
pub use service::handle_service_command;
pub use setup::handle_setup_command;
pub use sync::handle_sync_command;

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{FileSnapshotStore, PgCatalog, SystemctlController};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::traits::{CatalogClient, ServiceController, SnapshotStore};

/// The current version of pgbsync, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long a command waits for a catalog connection.
const CATALOG_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// The external systems a command talks to.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogClient>,
    pub store: Arc<dyn SnapshotStore>,
    pub service: Arc<dyn ServiceController>,
}

impl Services {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn SnapshotStore>,
        service: Arc<dyn ServiceController>,
    ) -> Self {
        Self {
            catalog,
            store,
            service,
        }
    }

    /// Production adapters. The catalog pool connects lazily.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let catalog = PgCatalog::connect_lazy(&config.database_url, CATALOG_ACQUIRE_TIMEOUT)?;
        Ok(Self::new(
            Arc::new(catalog),
            Arc::new(FileSnapshotStore::from_config(config)),
            Arc::new(SystemctlController::new(config.service_manager.as_str())),
        ))
    }
}

/// Run a CLI command and return its process exit code.
///
/// `Version` and `Help` are printed here too, though `main` answers them
/// before any config is loaded.
pub async fn run_cli_command(command: CliCommand, config: &SyncConfig, services: &Services) -> u8 {
    match command {
        CliCommand::Setup => {
            handle_setup_command(config, services, SyncConfig::bootstrap_password()).await
        }
        CliCommand::Daemon => handle_daemon_command(config, services, shutdown_signal()).await,
        CliCommand::Sync => handle_sync_command(config, services).await,
        CliCommand::Service(action) => handle_service_command(action, config, services).await,
        CliCommand::Version => {
            println!("pgbsync {}", VERSION);
            0
        }
        CliCommand::Help => {
            print!("{}", USAGE);
            0
        }
    }
}
