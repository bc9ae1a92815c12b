//! Unified error type for pgbsync.

use std::path::PathBuf;

use super::category::ErrorCategory;
use super::context::ErrorContext;
use crate::models::EncryptionScheme;

/// Unified error type for every stage of a sync cycle.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The catalog could not be reached.
    #[error("catalog unreachable: {message}")]
    Connectivity { message: String },

    /// The connecting role cannot read or mutate the authentication catalog.
    #[error("insufficient privilege on authentication catalog: {message}")]
    Privilege { message: String },

    /// A catalog query failed for another reason.
    #[error("catalog query failed: {message}")]
    Catalog { message: String },

    /// A hash is not encoded with the configured scheme.
    #[error("hash for '{username}' is not {expected}")]
    SchemeMismatch {
        username: String,
        expected: EncryptionScheme,
    },

    /// Every hash extraction step failed.
    #[error("could not extract a {target} hash for '{username}': {}", .attempts.join("; "))]
    Extraction {
        username: String,
        target: EncryptionScheme,
        attempts: Vec<String>,
    },

    /// The auth file could not be read.
    #[error("failed to read auth file {}: {source}", .path.display())]
    AuthFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The auth file could not be written or replaced.
    #[error("failed to write auth file {}: {source}", .path.display())]
    AuthFileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ownership or permissions could not be enforced on the auth file.
    #[error("failed to secure auth file {}: {message}", .path.display())]
    Permissions { path: PathBuf, message: String },

    /// Neither reload nor restart succeeded.
    #[error("proxy reload failed: {message}")]
    Reload { message: String },

    /// The service manager could not run a command.
    #[error("service command '{action} {unit}' failed: {message}")]
    Service {
        action: String,
        unit: String,
        message: String,
    },

    /// The snapshot store failed.
    #[error("state store error at {}: {message}", .path.display())]
    State { path: PathBuf, message: String },

    /// A captured snapshot failed validation.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Another process holds the single-writer lock.
    #[error("another sync is in progress (lock held on {})", .path.display())]
    LockHeld { path: PathBuf },

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapped error with additional context.
    #[error("{error} [{context}]")]
    WithContext {
        error: Box<SyncError>,
        context: ErrorContext,
    },
}

impl SyncError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Connectivity { .. } => ErrorCategory::Connectivity,
            SyncError::Privilege { .. } => ErrorCategory::Privilege,
            SyncError::Catalog { .. } => ErrorCategory::Catalog,
            SyncError::SchemeMismatch { .. } | SyncError::Extraction { .. } => {
                ErrorCategory::Scheme
            }
            SyncError::AuthFileRead { .. }
            | SyncError::AuthFileWrite { .. }
            | SyncError::Permissions { .. } => ErrorCategory::AuthFile,
            SyncError::Reload { .. } => ErrorCategory::Reload,
            SyncError::Service { .. } => ErrorCategory::Service,
            SyncError::State { .. } | SyncError::InvalidSnapshot(_) => ErrorCategory::State,
            SyncError::Config(_) | SyncError::LockHeld { .. } => ErrorCategory::Configuration,
            SyncError::Internal(_) => ErrorCategory::Internal,
            SyncError::WithContext { error, .. } => error.category(),
        }
    }

    /// Check if this error may be retried within the current cycle.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Process exit code for a CLI command failing with this error.
    pub fn exit_code(&self) -> u8 {
        self.category().exit_code()
    }

    /// Attach context to this error.
    ///
    /// Context already present is replaced rather than nested.
    pub fn with_context(self, context: ErrorContext) -> Self {
        match self {
            SyncError::WithContext { error, .. } => SyncError::WithContext { error, context },
            other => SyncError::WithContext {
                error: Box::new(other),
                context,
            },
        }
    }

    /// Get the attached context, if any.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SyncError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The error without any attached context.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::WithContext { error, .. } => error.root(),
            other => other,
        }
    }

    /// Build a state store error for `path`.
    pub fn state(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SyncError::State {
            path: path.into(),
            message: message.into(),
        }
    }
}
