//! Core data model: principals, snapshots, deltas and encryption schemes.

pub mod delta;
pub mod principal;
pub mod scheme;
pub mod snapshot;

pub use delta::{Delta, DeltaCounts};
pub use principal::Principal;
pub use scheme::{EncryptionScheme, UnknownScheme, SCRAM_PREFIX};
pub use snapshot::Snapshot;
