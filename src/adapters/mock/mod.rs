//! Mock implementations for testing.
//!
//! These let the whole sync pipeline run without a database server, a state
//! directory or a service manager.
//!
//! # Available Mocks
//!
//! - [`MockCatalog`] - Catalog with roles, a default scheme and failure toggles
//! - [`InMemorySnapshotStore`] - Two-slot snapshot store in memory
//! - [`MockServiceController`] - Service manager recording every call

pub mod catalog;
pub mod service;
pub mod state_store;

pub use catalog::MockCatalog;
pub use service::MockServiceController;
pub use state_store::InMemorySnapshotStore;
