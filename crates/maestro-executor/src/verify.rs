//! Post-condition verification.
//!
//! A strategy reporting completion is not enough: success requires the
//! intended effect to be observable. The verifier polls the condition
//! through the desktop driver until it holds or the spec deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use maestro_core::types::{VerificationResult, VerifyKind, VerifySpec};

use crate::desktop::{Desktop, DesktopError, WindowInfo};

/// Confirms that a step's intended effect actually occurred.
pub struct Verifier {
    desktop: Arc<dyn Desktop>,
    poll_interval: Duration,
}

impl Verifier {
    pub fn new(desktop: Arc<dyn Desktop>, poll_interval: Duration) -> Self {
        Self {
            desktop,
            poll_interval,
        }
    }

    /// Run the check, polling until it holds or the deadline passes.
    ///
    /// `negate` inverts the condition ("the dialog is gone"). Driver errors
    /// do not abort verification; polling continues until the deadline.
    pub async fn verify(&self, spec: &VerifySpec) -> VerificationResult {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(spec.timeout_secs);
        let mut last_observed: Option<String> = None;
        let mut last_error: Option<String> = None;

        loop {
            match self.check_once(spec).await {
                Ok((mut holds, observed)) => {
                    if spec.negate {
                        holds = !holds;
                    }
                    if holds {
                        return VerificationResult {
                            success: true,
                            expected: spec.value.clone(),
                            observed,
                            duration_ms: started.elapsed().as_millis() as u64,
                            error: None,
                        };
                    }
                    last_observed = observed;
                }
                Err(e) => {
                    debug!(error = %e, "Verification probe failed; will retry");
                    last_error = Some(e.to_string());
                }
            }

            if Instant::now() >= deadline {
                return VerificationResult {
                    success: false,
                    expected: spec.value.clone(),
                    observed: last_observed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(match last_error {
                        Some(e) => format!("timeout; last probe error: {}", e),
                        None => "timeout waiting for condition".to_string(),
                    }),
                };
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Active-window snapshot used in diagnostic records.
    pub async fn capture_state(&self) -> Option<WindowInfo> {
        self.desktop.active_window().await.ok().flatten()
    }

    async fn check_once(
        &self,
        spec: &VerifySpec,
    ) -> Result<(bool, Option<String>), DesktopError> {
        match spec.kind {
            VerifyKind::WindowTitleContains => {
                let window = self.desktop.active_window().await?;
                let title = window.map(|w| w.title);
                let holds = title
                    .as_deref()
                    .map(|t| t.to_lowercase().contains(&spec.value.to_lowercase()))
                    .unwrap_or(false);
                Ok((holds, title))
            }
            VerifyKind::TextVisible => {
                let holds = self.desktop.screen_contains_text(&spec.value).await?;
                Ok((holds, holds.then(|| spec.value.clone())))
            }
            VerifyKind::ProcessRunning => {
                let holds = self.desktop.process_running(&spec.value).await?;
                Ok((holds, holds.then(|| spec.value.clone())))
            }
            VerifyKind::ElementExists => {
                let holds = self.desktop.find_element(&spec.value).await?;
                Ok((holds, holds.then(|| spec.value.clone())))
            }
        }
    }
}
