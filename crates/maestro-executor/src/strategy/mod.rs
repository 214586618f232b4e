//! Strategy trait, outcome types, and the authoritative registry.
//!
//! The strategy set is closed: every variant of
//! [`maestro_core::types::StrategyKind`] maps to exactly one implementation
//! and one supported-tool list, declared once in
//! [`StrategyRegistry::standard`]. Production wiring and tests construct
//! registries through the same table, so the capability set can never
//! silently diverge between the two.

pub mod accessibility;
pub mod coords;
pub mod process;
pub mod vision;

use std::sync::Arc;

use async_trait::async_trait;

use maestro_core::types::{FailureClass, Step, StrategyKind};

use crate::desktop::{Desktop, DesktopError};
use crate::recovery;

pub use accessibility::AccessibilityStrategy;
pub use coords::CoordReplayStrategy;
pub use process::ProcessStrategy;
pub use vision::VisionStrategy;

/// A failed attempt, classified for the recovery layer.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub class: FailureClass,
    pub detail: String,
}

impl AttemptFailure {
    pub fn new(class: FailureClass, detail: impl Into<String>) -> Self {
        Self {
            class,
            detail: detail.into(),
        }
    }
}

impl From<DesktopError> for AttemptFailure {
    fn from(err: DesktopError) -> Self {
        Self {
            class: recovery::classify(&err),
            detail: err.to_string(),
        }
    }
}

/// Outcome of one strategy attempt.
///
/// Recoverable failure is data, not an exception: the executor's retry and
/// fallback decisions key off the carried [`FailureClass`].
#[derive(Debug)]
pub enum StrategyOutcome {
    /// The strategy believes the action happened. Verification still runs.
    Completed,
    Failed(AttemptFailure),
}

impl StrategyOutcome {
    pub fn failed(class: FailureClass, detail: impl Into<String>) -> Self {
        StrategyOutcome::Failed(AttemptFailure::new(class, detail))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StrategyOutcome::Completed)
    }
}

/// One automation technique that can attempt a single step.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Attempt the step. Never panics for expected failures; they come
    /// back as [`StrategyOutcome::Failed`].
    async fn attempt(&self, step: &Step) -> StrategyOutcome;
}

const ACCESSIBILITY_TOOLS: &[&str] = &[
    "click",
    "double_click",
    "right_click",
    "type",
    "keypress",
    "scroll",
    "focus_window",
];

const VISION_TOOLS: &[&str] = &["click", "double_click", "scroll"];

const COORD_TOOLS: &[&str] = &["click", "double_click", "right_click", "scroll", "drag"];

const PROCESS_TOOLS: &[&str] = &["open_app", "focus_app", "open_url", "wait"];

struct RegistryEntry {
    kind: StrategyKind,
    tools: &'static [&'static str],
    strategy: Arc<dyn Strategy>,
}

/// The single authoritative strategy table.
pub struct StrategyRegistry {
    entries: Vec<RegistryEntry>,
}

impl StrategyRegistry {
    /// Build the standard registry over a desktop driver.
    ///
    /// This is the only place strategies are registered.
    pub fn standard(desktop: Arc<dyn Desktop>) -> Self {
        Self {
            entries: vec![
                RegistryEntry {
                    kind: StrategyKind::Accessibility,
                    tools: ACCESSIBILITY_TOOLS,
                    strategy: Arc::new(AccessibilityStrategy::new(Arc::clone(&desktop))),
                },
                RegistryEntry {
                    kind: StrategyKind::Vision,
                    tools: VISION_TOOLS,
                    strategy: Arc::new(VisionStrategy::new(Arc::clone(&desktop))),
                },
                RegistryEntry {
                    kind: StrategyKind::CoordReplay,
                    tools: COORD_TOOLS,
                    strategy: Arc::new(CoordReplayStrategy::new(Arc::clone(&desktop))),
                },
                RegistryEntry {
                    kind: StrategyKind::Process,
                    tools: PROCESS_TOOLS,
                    strategy: Arc::new(ProcessStrategy::new(desktop)),
                },
            ],
        }
    }

    /// Look up the implementation for a kind.
    pub fn strategy(&self, kind: StrategyKind) -> Option<Arc<dyn Strategy>> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| Arc::clone(&e.strategy))
    }

    /// Whether a kind declares support for a tool.
    pub fn supports(&self, kind: StrategyKind, tool: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == kind && e.tools.contains(&tool))
    }

    /// Filter a ranked kind order down to the candidates for a tool,
    /// preserving the order.
    pub fn candidates_for(&self, tool: &str, order: &[StrategyKind]) -> Vec<StrategyKind> {
        order
            .iter()
            .copied()
            .filter(|kind| self.supports(*kind, tool))
            .collect()
    }

    /// All registered kinds, in table order.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }
}
