//! Error category classification for unified error handling.
//!
//! Categories drive the two decisions callers make about an error: whether
//! the stage may retry it within the current cycle, and which exit code a
//! CLI command reports.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Catalog unreachable (connection refused, timeouts, server starting).
    /// Retried inside the snapshot stage.
    Connectivity,

    /// Insufficient privilege to read or mutate the authentication catalog.
    Privilege,

    /// Any other catalog query failure.
    Catalog,

    /// A hash does not match the configured encryption scheme.
    Scheme,

    /// The auth file could not be read, written or replaced.
    AuthFile,

    /// The proxy could not be reloaded or restarted.
    Reload,

    /// The service manager could not run a lifecycle command.
    Service,

    /// The snapshot state store or snapshot validation failed.
    State,

    /// Invalid configuration or another writer holding the sync lock.
    Configuration,

    /// Programming or environment errors nobody can act on.
    Internal,
}

impl ErrorCategory {
    /// Returns true if errors in this category are transient and the
    /// operation can be retried within the same cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Connectivity)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connectivity => "connectivity",
            ErrorCategory::Privilege => "privilege",
            ErrorCategory::Catalog => "catalog",
            ErrorCategory::Scheme => "scheme",
            ErrorCategory::AuthFile => "auth_file",
            ErrorCategory::Reload => "reload",
            ErrorCategory::Service => "service",
            ErrorCategory::State => "state",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Process exit code a CLI command reports for this category.
    ///
    /// Everything is a handled failure (1) except internal errors (2).
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorCategory::Internal => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
