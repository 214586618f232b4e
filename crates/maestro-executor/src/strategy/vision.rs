//! Visual-recognition strategy.
//!
//! Locates the target by its visible text and clicks the found point.
//! Slower and less precise than the accessibility tree, but works against
//! apps that expose nothing structural.

use std::sync::Arc;

use async_trait::async_trait;

use maestro_core::types::{FailureClass, Step, StrategyKind};

use crate::desktop::Desktop;

use super::{Strategy, StrategyOutcome};

pub struct VisionStrategy {
    desktop: Arc<dyn Desktop>,
}

impl VisionStrategy {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }

    async fn locate(&self, step: &Step) -> Result<(i64, i64), StrategyOutcome> {
        let Some(target) = step.arg_str("target") else {
            return Err(StrategyOutcome::failed(
                FailureClass::TargetNotFound,
                "no target text on step",
            ));
        };
        match self.desktop.locate_text(target).await {
            Ok(Some(point)) => Ok(point),
            Ok(None) => Err(StrategyOutcome::failed(
                FailureClass::TargetNotFound,
                format!("text not visible on screen: {}", target),
            )),
            Err(e) => Err(StrategyOutcome::Failed(e.into())),
        }
    }
}

#[async_trait]
impl Strategy for VisionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vision
    }

    async fn attempt(&self, step: &Step) -> StrategyOutcome {
        let result = match step.tool.as_str() {
            "click" | "double_click" => {
                let (x, y) = match self.locate(step).await {
                    Ok(point) => point,
                    Err(outcome) => return outcome,
                };
                let mut result = self.desktop.click_point(x, y).await;
                if step.tool == "double_click" && result.is_ok() {
                    result = self.desktop.click_point(x, y).await;
                }
                result
            }
            "scroll" => {
                let delta = step.arg_i64("delta").unwrap_or(-3);
                self.desktop.scroll(delta).await
            }
            other => {
                return StrategyOutcome::failed(
                    FailureClass::Unknown,
                    format!("vision strategy cannot run tool '{}'", other),
                );
            }
        };

        match result {
            Ok(()) => StrategyOutcome::Completed,
            Err(e) => StrategyOutcome::Failed(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDesktop;

    #[tokio::test]
    async fn test_click_visible_text() {
        let desktop = Arc::new(ScriptedDesktop::new());
        desktop.add_visible_text("Save");
        let strategy = VisionStrategy::new(desktop.clone());

        let step = Step::new("click", "Click save").with_arg("target", serde_json::json!("Save"));
        assert!(strategy.attempt(&step).await.is_completed());
        assert_eq!(desktop.point_clicks(), 1);
    }

    #[tokio::test]
    async fn test_invisible_text_is_target_not_found() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = VisionStrategy::new(desktop);

        let step = Step::new("click", "Click save").with_arg("target", serde_json::json!("Save"));
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => {
                assert_eq!(f.class, FailureClass::TargetNotFound);
                assert!(f.detail.contains("not visible"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_double_click_clicks_point_twice() {
        let desktop = Arc::new(ScriptedDesktop::new());
        desktop.add_visible_text("icon");
        let strategy = VisionStrategy::new(desktop.clone());

        let step =
            Step::new("double_click", "Open icon").with_arg("target", serde_json::json!("icon"));
        assert!(strategy.attempt(&step).await.is_completed());
        assert_eq!(desktop.point_clicks(), 2);
    }

    #[tokio::test]
    async fn test_type_is_not_a_vision_tool() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = VisionStrategy::new(desktop);
        let step = Step::new("type", "Type text").with_arg("text", serde_json::json!("hi"));
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => assert_eq!(f.class, FailureClass::Unknown),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
