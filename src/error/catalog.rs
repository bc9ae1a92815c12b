//! Classification of catalog driver errors.

use super::sync_error::SyncError;

/// SQLSTATE for `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// SQLSTATE for `cannot_connect_now` (server starting up or shutting down).
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Map a `sqlx` error onto the sync error taxonomy.
///
/// Transport failures and connection-class SQLSTATEs (`08xxx`) become
/// connectivity errors so the snapshot stage retries them; privilege and
/// authentication failures (`42501`, `28xxx`) are never retried.
pub fn classify_sqlx_error(err: sqlx::Error) -> SyncError {
    match err {
        sqlx::Error::Io(e) => SyncError::Connectivity {
            message: e.to_string(),
        },
        sqlx::Error::Tls(e) => SyncError::Connectivity {
            message: format!("TLS: {}", e),
        },
        sqlx::Error::PoolTimedOut => SyncError::Connectivity {
            message: "timed out waiting for a catalog connection".to_string(),
        },
        sqlx::Error::PoolClosed => SyncError::Connectivity {
            message: "connection pool closed".to_string(),
        },
        sqlx::Error::WorkerCrashed => SyncError::Connectivity {
            message: "connection worker crashed".to_string(),
        },
        sqlx::Error::Configuration(e) => SyncError::Config(e.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            let message = format!("{} (SQLSTATE {})", db.message(), code);
            if code == INSUFFICIENT_PRIVILEGE || code.starts_with("28") {
                SyncError::Privilege { message }
            } else if code.starts_with("08") || code == CANNOT_CONNECT_NOW {
                SyncError::Connectivity { message }
            } else {
                SyncError::Catalog { message }
            }
        }
        other => SyncError::Catalog {
            message: other.to_string(),
        },
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        classify_sqlx_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_io_is_connectivity() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(classify_sqlx_error(err).category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn test_pool_timeout_is_connectivity() {
        assert!(classify_sqlx_error(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_row_not_found_is_catalog() {
        assert_eq!(
            classify_sqlx_error(sqlx::Error::RowNotFound).category(),
            ErrorCategory::Catalog
        );
    }
}
