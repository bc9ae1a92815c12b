//! pgbsync - keeps a PgBouncer auth file in sync with PostgreSQL credentials
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod authfile;
pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod extract;
pub mod lock;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod reload;
pub mod snapshot;
pub mod traits;
