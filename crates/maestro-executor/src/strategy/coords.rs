//! Coordinate-replay strategy.
//!
//! Blindly replays recorded screen coordinates. Fragile under layout
//! changes, so the ranker keeps it out of first place; it exists as the
//! last resort when nothing smarter can see the target.

use std::sync::Arc;

use async_trait::async_trait;

use maestro_core::types::{FailureClass, Step, StrategyKind};

use crate::desktop::Desktop;

use super::{Strategy, StrategyOutcome};

pub struct CoordReplayStrategy {
    desktop: Arc<dyn Desktop>,
}

impl CoordReplayStrategy {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }

    fn point(&self, step: &Step) -> Option<(i64, i64)> {
        Some((step.arg_i64("x")?, step.arg_i64("y")?))
    }
}

#[async_trait]
impl Strategy for CoordReplayStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CoordReplay
    }

    async fn attempt(&self, step: &Step) -> StrategyOutcome {
        let result = match step.tool.as_str() {
            "click" | "double_click" | "right_click" => {
                let Some((x, y)) = self.point(step) else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "step carries no x/y coordinates",
                    );
                };
                let mut result = self.desktop.click_point(x, y).await;
                if step.tool == "double_click" && result.is_ok() {
                    result = self.desktop.click_point(x, y).await;
                }
                result
            }
            "drag" => {
                let from = self.point(step);
                let to = step
                    .arg_i64("to_x")
                    .zip(step.arg_i64("to_y"));
                let (Some((x, y)), Some((tx, ty))) = (from, to) else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "drag requires x/y and to_x/to_y",
                    );
                };
                // Modeled as press at origin, release at destination.
                match self.desktop.click_point(x, y).await {
                    Ok(()) => self.desktop.click_point(tx, ty).await,
                    Err(e) => Err(e),
                }
            }
            "scroll" => {
                let delta = step.arg_i64("delta").unwrap_or(-3);
                self.desktop.scroll(delta).await
            }
            other => {
                return StrategyOutcome::failed(
                    FailureClass::Unknown,
                    format!("coordinate strategy cannot run tool '{}'", other),
                );
            }
        };

        match result {
            Ok(()) => StrategyOutcome::Completed,
            Err(e) => StrategyOutcome::Failed(e.into()),
        }
    }
}
