use serde::{Deserialize, Serialize};

use crate::types::{PlanId, PlanOutcome, StepId, StrategyKind, Timestamp};

/// Progress events emitted by the executor while a plan runs.
///
/// Events are fanned out to observers over a non-blocking broadcast channel
/// and also summarized into the audit log. Delivery never stalls execution;
/// a slow observer loses the oldest events instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExecutionEvent {
    /// A step is about to run.
    StepStarted {
        plan_id: PlanId,
        step_id: StepId,
        tool: String,
        timestamp: Timestamp,
    },

    /// The executor moved on to the next candidate strategy.
    StepStrategySwitch {
        plan_id: PlanId,
        step_id: StepId,
        from: StrategyKind,
        to: StrategyKind,
        timestamp: Timestamp,
    },

    /// A strategy reported completion; verification is running.
    StepVerifying {
        plan_id: PlanId,
        step_id: StepId,
        strategy: StrategyKind,
        timestamp: Timestamp,
    },

    /// The step completed and its effect was confirmed.
    StepSucceeded {
        plan_id: PlanId,
        step_id: StepId,
        strategy: StrategyKind,
        attempts: u32,
        timestamp: Timestamp,
    },

    /// Every candidate strategy was exhausted.
    StepFailed {
        plan_id: PlanId,
        step_id: StepId,
        error: String,
        timestamp: Timestamp,
    },

    /// The plan paused because the environment is locked.
    PlanPaused {
        plan_id: PlanId,
        step_id: StepId,
        reason: String,
        timestamp: Timestamp,
    },

    /// The environment cleared and execution resumed.
    PlanResumed {
        plan_id: PlanId,
        step_id: StepId,
        timestamp: Timestamp,
    },

    /// Execution stopped before completion (authorization lost, circuit
    /// open, budget exhausted).
    PlanAborted {
        plan_id: PlanId,
        reason: String,
        timestamp: Timestamp,
    },

    /// Execution reached a terminal outcome.
    PlanFinished {
        plan_id: PlanId,
        outcome: PlanOutcome,
        timestamp: Timestamp,
    },
}

impl ExecutionEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ExecutionEvent::StepStarted { timestamp, .. }
            | ExecutionEvent::StepStrategySwitch { timestamp, .. }
            | ExecutionEvent::StepVerifying { timestamp, .. }
            | ExecutionEvent::StepSucceeded { timestamp, .. }
            | ExecutionEvent::StepFailed { timestamp, .. }
            | ExecutionEvent::PlanPaused { timestamp, .. }
            | ExecutionEvent::PlanResumed { timestamp, .. }
            | ExecutionEvent::PlanAborted { timestamp, .. }
            | ExecutionEvent::PlanFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the wire name used by external observers.
    pub fn event_name(&self) -> &'static str {
        match self {
            ExecutionEvent::StepStarted { .. } => "step-started",
            ExecutionEvent::StepStrategySwitch { .. } => "step-strategy-switch",
            ExecutionEvent::StepVerifying { .. } => "step-verifying",
            ExecutionEvent::StepSucceeded { .. } => "step-succeeded",
            ExecutionEvent::StepFailed { .. } => "step-failed",
            ExecutionEvent::PlanPaused { .. } => "plan-paused",
            ExecutionEvent::PlanResumed { .. } => "plan-resumed",
            ExecutionEvent::PlanAborted { .. } => "plan-aborted",
            ExecutionEvent::PlanFinished { .. } => "plan-finished",
        }
    }

    /// Returns the plan this event belongs to.
    pub fn plan_id(&self) -> PlanId {
        match self {
            ExecutionEvent::StepStarted { plan_id, .. }
            | ExecutionEvent::StepStrategySwitch { plan_id, .. }
            | ExecutionEvent::StepVerifying { plan_id, .. }
            | ExecutionEvent::StepSucceeded { plan_id, .. }
            | ExecutionEvent::StepFailed { plan_id, .. }
            | ExecutionEvent::PlanPaused { plan_id, .. }
            | ExecutionEvent::PlanResumed { plan_id, .. }
            | ExecutionEvent::PlanAborted { plan_id, .. }
            | ExecutionEvent::PlanFinished { plan_id, .. } => *plan_id,
        }
    }
}
