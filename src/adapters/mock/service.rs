//! Service manager mock for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{SyncError, SyncResult};
use crate::traits::{ServiceAction, ServiceController, ServiceOutput};

#[derive(Debug, Default)]
struct ServiceScript {
    failing: HashMap<ServiceAction, ServiceOutput>,
    unavailable: bool,
    calls: Vec<(ServiceAction, String)>,
}

/// [`ServiceController`] that records calls and succeeds unless told otherwise.
///
/// # Example
///
/// ```ignore
/// let service = MockServiceController::new();
/// service.fail_action(ServiceAction::Reload, 1, "reload not supported");
/// // ... run a cycle ...
/// assert_eq!(service.actions(), vec![ServiceAction::Reload, ServiceAction::Restart]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockServiceController {
    script: Arc<Mutex<ServiceScript>>,
}

impl MockServiceController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServiceScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `action` exit with `code` and `stderr`.
    pub fn fail_action(&self, action: ServiceAction, code: i32, stderr: &str) {
        self.lock()
            .failing
            .insert(action, ServiceOutput::failed(code, stderr));
    }

    /// Make every call fail to spawn.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Every `(action, unit)` invoked, in order.
    pub fn calls(&self) -> Vec<(ServiceAction, String)> {
        self.lock().calls.clone()
    }

    /// Actions invoked, in order.
    pub fn actions(&self) -> Vec<ServiceAction> {
        self.lock().calls.iter().map(|(a, _)| *a).collect()
    }
}

#[async_trait]
impl ServiceController for MockServiceController {
    async fn run(&self, action: ServiceAction, unit: &str) -> SyncResult<ServiceOutput> {
        let mut script = self.lock();
        script.calls.push((action, unit.to_string()));
        if script.unavailable {
            return Err(SyncError::Service {
                action: action.to_string(),
                unit: unit.to_string(),
                message: "service manager not found (mock)".to_string(),
            });
        }
        Ok(script
            .failing
            .get(&action)
            .cloned()
            .unwrap_or_else(ServiceOutput::ok))
    }
}
