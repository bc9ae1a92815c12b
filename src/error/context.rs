//! Error context for enriched error information.
//!
//! Every error the daemon logs carries the stage it failed in and, when one
//! is involved, the principal it was processing.

use chrono::{DateTime, Utc};
use std::fmt;

/// Context information attached to errors for debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    /// Pipeline stage or command that failed (e.g. `snapshotting`, `setup`).
    pub stage: String,

    /// Principal being processed, if any.
    pub principal: Option<String>,

    /// Correlation id of the monitor cycle.
    pub cycle_id: Option<String>,

    /// Number of attempts made before this error.
    pub attempts: u32,

    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    /// Create a new ErrorContext for a stage.
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            principal: None,
            cycle_id: None,
            attempts: 0,
            timestamp: Utc::now(),
        }
    }

    /// Set the principal for this context.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Set the cycle id for this context.
    pub fn with_cycle_id(mut self, cycle_id: impl Into<String>) -> Self {
        self.cycle_id = Some(cycle_id.into());
        self
    }

    /// Set the attempt count for this context.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Get a formatted context string suitable for logging.
    pub fn to_log_string(&self) -> String {
        let mut parts = vec![format!("stage={}", self.stage)];

        if let Some(ref principal) = self.principal {
            parts.push(format!("principal={}", principal));
        }

        if let Some(ref cycle_id) = self.cycle_id {
            parts.push(format!("cycle={}", cycle_id));
        }

        if self.attempts > 0 {
            parts.push(format!("attempts={}", self.attempts));
        }

        parts.join(" ")
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_log_string())
    }
}
