//! Unified error handling for pgbsync.
//!
//! - **Error Categories**: classification driving retry and exit codes
//! - **Unified Error Type**: `SyncError` covers every pipeline stage
//! - **Error Context**: stage, principal and cycle id attached to errors
//! - **Result Type Alias**: `SyncResult<T>` for consistent return types
//!
//! | Category | Description | Retried in-cycle | Exit code |
//! |----------|-------------|------------------|-----------|
//! | Connectivity | Catalog unreachable | Yes | 1 |
//! | Privilege | Cannot read `pg_authid` | No | 1 |
//! | Catalog | Other query failures | No | 1 |
//! | Scheme | Hash in the wrong scheme | No | 1 |
//! | AuthFile | Auth file read/write | No | 1 |
//! | Reload | Proxy reload/restart | No | 1 |
//! | Service | Service manager command | No | 1 |
//! | State | Snapshot store, validation | No | 1 |
//! | Configuration | Config, sync lock held | No | 1 |
//! | Internal | Unexpected | No | 2 |

mod catalog;
mod category;
mod context;
mod result;
mod sync_error;

pub use catalog::classify_sqlx_error;
pub use category::ErrorCategory;
pub use context::ErrorContext;
pub use result::{ResultExt, SyncResult};
pub use sync_error::SyncError;
