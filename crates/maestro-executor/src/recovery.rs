//! Failure classification and remediation.
//!
//! Maps driver errors to the closed [`FailureClass`] set and performs the
//! remediation action for recoverable classes before the executor's single
//! same-strategy retry. `EnvironmentLocked` is deliberately not handled
//! here: the executor owns the pause/resume flow for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use maestro_core::types::{FailureClass, Step, StepId};

use crate::desktop::{Desktop, DesktopError};

/// Map a driver error to its failure class.
///
/// This is the single classification table; strategies and the executor
/// both go through it, so retry decisions are data-driven.
pub fn classify(err: &DesktopError) -> FailureClass {
    match err {
        DesktopError::ElementNotFound(_) => FailureClass::TargetNotFound,
        DesktopError::DialogBlocking(_) => FailureClass::BlockingDialog,
        DesktopError::WindowUnavailable(_) | DesktopError::FocusLost(_) => {
            FailureClass::FocusStolen
        }
        DesktopError::SessionLocked => FailureClass::EnvironmentLocked,
        DesktopError::InputRejected(_)
        | DesktopError::Unsupported(_)
        | DesktopError::Other(_) => FailureClass::Unknown,
    }
}

/// Remediation limits.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    /// Remediation attempts allowed for one step.
    pub max_per_step: u32,
    /// Remediation attempts allowed across a whole plan.
    pub max_per_plan: u32,
    /// Settle delay before a target-not-found re-scan.
    pub settle: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_per_step: 2,
            max_per_plan: 5,
            settle: Duration::from_millis(300),
        }
    }
}

/// Classifies failures and performs bounded remediation.
pub struct RecoveryManager {
    desktop: Arc<dyn Desktop>,
    policy: RecoveryPolicy,
    per_step: Mutex<HashMap<StepId, u32>>,
    plan_total: Mutex<u32>,
}

impl RecoveryManager {
    pub fn new(desktop: Arc<dyn Desktop>, policy: RecoveryPolicy) -> Self {
        Self {
            desktop,
            policy,
            per_step: Mutex::new(HashMap::new()),
            plan_total: Mutex::new(0),
        }
    }

    /// Reset remediation counters at the start of a plan.
    pub fn reset_plan(&self) {
        self.per_step.lock().unwrap().clear();
        *self.plan_total.lock().unwrap() = 0;
    }

    /// Whether remediation is still allowed for this class and step.
    pub fn can_recover(&self, class: FailureClass, step_id: StepId) -> bool {
        if !class.is_recoverable() {
            return false;
        }
        let step_used = *self.per_step.lock().unwrap().get(&step_id).unwrap_or(&0);
        if step_used >= self.policy.max_per_step {
            debug!(step_id = %step_id, "Per-step remediation limit reached");
            return false;
        }
        if *self.plan_total.lock().unwrap() >= self.policy.max_per_plan {
            debug!("Per-plan remediation limit reached");
            return false;
        }
        true
    }

    /// Perform the remediation action for a recoverable class.
    ///
    /// Returns whether remediation did something useful; the caller then
    /// retries the same strategy exactly once.
    pub async fn remediate(&self, class: FailureClass, step: &Step) -> bool {
        let acted = match class {
            FailureClass::BlockingDialog => match self.desktop.dismiss_dialog().await {
                Ok(dismissed) => dismissed,
                Err(e) => {
                    debug!(error = %e, "Dialog dismissal failed");
                    false
                }
            },
            FailureClass::FocusStolen => {
                let expected = step
                    .arg_str("window")
                    .or_else(|| step.arg_str("app_name"));
                match expected {
                    Some(fragment) => match self.desktop.focus_window(fragment).await {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(error = %e, "Refocus failed");
                            false
                        }
                    },
                    None => false,
                }
            }
            FailureClass::TargetNotFound => {
                // The UI may still be settling; wait before the re-scan.
                tokio::time::sleep(self.policy.settle).await;
                true
            }
            // Owned by the executor's pause flow / not remediable.
            FailureClass::EnvironmentLocked | FailureClass::Unknown => false,
        };

        if acted {
            *self
                .per_step
                .lock()
                .unwrap()
                .entry(step.id)
                .or_insert(0) += 1;
            *self.plan_total.lock().unwrap() += 1;
            info!(step_id = %step.id, class = %class, "Remediation performed");
        }
        acted
    }
}
