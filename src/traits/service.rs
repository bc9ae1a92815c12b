//! Service manager port.

use async_trait::async_trait;
use std::fmt;

use crate::error::SyncResult;

/// Lifecycle operations passed through to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    Status,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Reload => "reload",
            ServiceAction::Status => "status",
        }
    }

    /// Parse a lifecycle subcommand name. `reload` is internal only.
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "start" => Some(ServiceAction::Start),
            "stop" => Some(ServiceAction::Stop),
            "restart" => Some(ServiceAction::Restart),
            "status" => Some(ServiceAction::Status),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one service manager invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ServiceOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Best human-readable explanation of a failure.
    pub fn describe(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        match (self.code, text.is_empty()) {
            (Some(code), true) => format!("exit status {}", code),
            (Some(code), false) => format!("exit status {}: {}", code, text),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => text.to_string(),
        }
    }
}

/// Runs lifecycle commands for a named unit.
///
/// `Err` means the command could not be run at all; a command that ran and
/// failed returns `Ok` with `success == false`.
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn run(&self, action: ServiceAction, unit: &str) -> SyncResult<ServiceOutput>;
}
