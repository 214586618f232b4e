//! Process-control strategy.
//!
//! System-level actions that do not touch UI elements: launching and
//! focusing applications, opening URLs, and bounded waits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use maestro_core::types::{FailureClass, Step, StrategyKind};

use crate::desktop::Desktop;

use super::{Strategy, StrategyOutcome};

/// Upper bound on the `wait` tool, whatever the step asks for.
const MAX_WAIT_SECS: u64 = 30;

pub struct ProcessStrategy {
    desktop: Arc<dyn Desktop>,
}

impl ProcessStrategy {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }
}

#[async_trait]
impl Strategy for ProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Process
    }

    async fn attempt(&self, step: &Step) -> StrategyOutcome {
        let result = match step.tool.as_str() {
            "open_app" => {
                let Some(app) = step.arg_str("app_name") else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "no app_name on step",
                    );
                };
                self.desktop.launch_app(app).await
            }
            "focus_app" => {
                let Some(app) = step.arg_str("app_name") else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "no app_name on step",
                    );
                };
                self.desktop.focus_window(app).await
            }
            "open_url" => {
                let Some(url) = step.arg_str("url") else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "no url on step",
                    );
                };
                self.desktop.open_url(url).await
            }
            "wait" => {
                let secs = step
                    .arg_i64("seconds")
                    .unwrap_or(1)
                    .clamp(0, MAX_WAIT_SECS as i64) as u64;
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok(())
            }
            other => {
                return StrategyOutcome::failed(
                    FailureClass::Unknown,
                    format!("process strategy cannot run tool '{}'", other),
                );
            }
        };

        match result {
            Ok(()) => StrategyOutcome::Completed,
            Err(e) => StrategyOutcome::Failed(e.into()),
        }
    }
}
