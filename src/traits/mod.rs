//! Trait abstractions for dependency injection and testability.
//!
//! Every external collaborator of the sync pipeline sits behind one of these
//! ports so the pipeline can run against in-memory mocks in tests.
//!
//! # Traits
//!
//! - [`CatalogClient`] - Authentication catalog reads and privileged mutations
//! - [`SnapshotStore`] - Two-slot snapshot persistence and the staged delta
//! - [`ServiceController`] - Service manager lifecycle commands

pub mod catalog;
pub mod service;
pub mod state_store;

pub use catalog::{CatalogClient, CatalogRow};
pub use service::{ServiceAction, ServiceController, ServiceOutput};
pub use state_store::SnapshotStore;
