//! Structural accessibility-tree strategy.
//!
//! The most reliable technique when the target app exposes a proper
//! accessibility tree; tried first by default.

use std::sync::Arc;

use async_trait::async_trait;

use maestro_core::types::{FailureClass, Step, StrategyKind};

use crate::desktop::Desktop;

use super::{Strategy, StrategyOutcome};

pub struct AccessibilityStrategy {
    desktop: Arc<dyn Desktop>,
}

impl AccessibilityStrategy {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }

    fn target<'a>(&self, step: &'a Step) -> Option<&'a str> {
        step.arg_str("target").or_else(|| step.arg_str("selector"))
    }
}

#[async_trait]
impl Strategy for AccessibilityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Accessibility
    }

    async fn attempt(&self, step: &Step) -> StrategyOutcome {
        let result = match step.tool.as_str() {
            "click" | "double_click" | "right_click" => {
                let Some(target) = self.target(step) else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "no target selector on step",
                    );
                };
                let mut result = self.desktop.click_element(target).await;
                if step.tool == "double_click" && result.is_ok() {
                    result = self.desktop.click_element(target).await;
                }
                result
            }
            "type" => {
                let text = step.arg_str("text").unwrap_or_default();
                self.desktop.type_text(text).await
            }
            "keypress" => {
                let keys: Vec<String> = step
                    .args
                    .get("keys")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|k| k.as_str())
                            .map(|k| k.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                self.desktop.press_keys(&keys).await
            }
            "scroll" => {
                let delta = step.arg_i64("delta").unwrap_or(-3);
                self.desktop.scroll(delta).await
            }
            "focus_window" => {
                let Some(title) = step.arg_str("title").or_else(|| self.target(step)) else {
                    return StrategyOutcome::failed(
                        FailureClass::TargetNotFound,
                        "no window title on step",
                    );
                };
                self.desktop.focus_window(title).await
            }
            other => {
                return StrategyOutcome::failed(
                    FailureClass::Unknown,
                    format!("accessibility strategy cannot run tool '{}'", other),
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

    fn strategy_with(desktop: Arc<ScriptedDesktop>) -> AccessibilityStrategy {
        AccessibilityStrategy::new(desktop)
    }

    #[tokio::test]
    async fn test_click_known_element_completes() {
        let desktop = Arc::new(ScriptedDesktop::new());
        desktop.add_element("Save");
        let strategy = strategy_with(desktop.clone());

        let step = Step::new("click", "Click save").with_arg("target", serde_json::json!("Save"));
        assert!(strategy.attempt(&step).await.is_completed());
        assert_eq!(desktop.clicks(), vec!["Save"]);
    }

    #[tokio::test]
    async fn test_click_missing_element_is_target_not_found() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = strategy_with(desktop);

        let step = Step::new("click", "Click save").with_arg("target", serde_json::json!("Save"));
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => {
                assert_eq!(f.class, FailureClass::TargetNotFound);
                assert!(f.detail.contains("Save"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_click_without_target_fails_without_driver_call() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = strategy_with(desktop.clone());

        let step = Step::new("click", "Click something");
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => assert_eq!(f.class, FailureClass::TargetNotFound),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(desktop.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_type_records_text() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = strategy_with(desktop.clone());

        let step = Step::new("type", "Type note").with_arg("text", serde_json::json!("hello"));
        assert!(strategy.attempt(&step).await.is_completed());
        assert_eq!(desktop.typed(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_double_click_clicks_twice() {
        let desktop = Arc::new(ScriptedDesktop::new());
        desktop.add_element("icon");
        let strategy = strategy_with(desktop.clone());

        let step =
            Step::new("double_click", "Open icon").with_arg("target", serde_json::json!("icon"));
        assert!(strategy.attempt(&step).await.is_completed());
        assert_eq!(desktop.clicks().len(), 2);
    }

    #[tokio::test]
    async fn test_locked_desktop_maps_to_environment_locked() {
        let desktop = Arc::new(ScriptedDesktop::new());
        desktop.add_element("Save");
        desktop.set_locked_polls(10);
        let strategy = strategy_with(desktop);

        let step = Step::new("click", "Click save").with_arg("target", serde_json::json!("Save"));
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => {
                assert_eq!(f.class, FailureClass::EnvironmentLocked);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_tool_fails_as_unknown() {
        let desktop = Arc::new(ScriptedDesktop::new());
        let strategy = strategy_with(desktop);

        let step = Step::new("open_app", "Open app");
        match strategy.attempt(&step).await {
            StrategyOutcome::Failed(f) => assert_eq!(f.class, FailureClass::Unknown),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
