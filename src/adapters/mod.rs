//! Concrete implementations of the ports in `crate::traits`.
//!
//! # Adapters
//!
//! - [`PgCatalog`] - Authentication catalog over `sqlx`
//! - [`FileSnapshotStore`] - JSON state files in the state directory
//! - [`SystemctlController`] - Service manager executable
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles for all adapters:
//! - [`mock::MockCatalog`] - In-memory catalog with failure toggles
//! - [`mock::InMemorySnapshotStore`] - In-memory two-slot store
//! - [`mock::MockServiceController`] - Records calls, scripted failures

pub mod file_state_store;
pub mod mock;
pub mod pg_catalog;
pub mod systemctl;

pub use file_state_store::FileSnapshotStore;
pub use mock::{InMemorySnapshotStore, MockCatalog, MockServiceController};
pub use pg_catalog::PgCatalog;
pub use systemctl::SystemctlController;
