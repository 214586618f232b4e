//! The reliable executor: one cooperative loop per plan.
//!
//! Each step walks `Pending -> Attempting(strategy) -> Verifying ->
//! {Success | next strategy | Failed}`. Authorization is re-checked before
//! every attempt as a safety gate, not an optimization; a locked
//! environment pauses the plan instead of failing it; consecutive step
//! failures trip the circuit breaker. All waits are suspension points, so
//! status queries and event delivery keep running alongside execution.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};

use maestro_core::config::{BudgetConfig, ExecutorConfig};
use maestro_core::error::{MaestroError, Result};
use maestro_core::events::ExecutionEvent;
use maestro_core::types::{
    ExecutionReport, FailureClass, Plan, PlanId, PlanOutcome, Step, StepId, StepResult,
    StrategyKind, Timestamp,
};
use maestro_safety::audit::{AuditLog, AuditRecord};
use maestro_safety::session::SessionAuthority;

use crate::broadcast::EventBroadcaster;
use crate::budget::ExecutionBudget;
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::desktop::Desktop;
use crate::ranker::StrategyRanker;
use crate::recovery::RecoveryManager;
use crate::strategy::{StrategyOutcome, StrategyRegistry};
use crate::verify::Verifier;

/// Diagnostic snapshots carry the last few event names.
const RECENT_EVENTS: usize = 10;

enum AbortKind {
    Authorization,
    Budget(String),
}

enum StepFlow {
    /// The step ran to a result (success or ordinary failure).
    Done(StepResult),
    /// Execution must stop now; remaining steps never run.
    Aborted { result: StepResult, kind: AbortKind },
    /// The plan stayed paused past the pause timeout.
    PauseTimeout(StepResult),
}

enum PauseOutcome {
    Cleared,
    TimedOut,
    AuthorizationLost,
}

/// Orchestrates step-by-step execution of admitted plans.
///
/// All collaborators are injected; the executor owns no global state.
pub struct ReliableExecutor {
    registry: StrategyRegistry,
    verifier: Verifier,
    ranker: StrategyRanker,
    recovery: RecoveryManager,
    session: Arc<SessionAuthority>,
    audit: Arc<AuditLog>,
    broadcaster: EventBroadcaster,
    desktop: Arc<dyn Desktop>,
    circuit: CircuitBreaker,
    budget: ExecutionBudget,
    config: ExecutorConfig,
    recent_events: Mutex<VecDeque<String>>,
}

impl ReliableExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: StrategyRegistry,
        verifier: Verifier,
        ranker: StrategyRanker,
        recovery: RecoveryManager,
        session: Arc<SessionAuthority>,
        audit: Arc<AuditLog>,
        broadcaster: EventBroadcaster,
        desktop: Arc<dyn Desktop>,
        config: ExecutorConfig,
        budget_config: BudgetConfig,
    ) -> Self {
        let circuit = CircuitBreaker::new(
            config.circuit_threshold,
            Duration::from_secs(config.circuit_cooldown_secs),
        );
        let budget = ExecutionBudget::new(budget_config);
        Self {
            registry,
            verifier,
            ranker,
            recovery,
            session,
            audit,
            broadcaster,
            desktop,
            circuit,
            budget,
            config,
            recent_events: Mutex::new(VecDeque::new()),
        }
    }

    /// Subscribe an observer to the progress event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.broadcaster.subscribe()
    }

    /// Learned strategy statistics.
    pub fn ranker(&self) -> &StrategyRanker {
        &self.ranker
    }

    /// Current circuit breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    /// Execute an admitted plan to a terminal report.
    ///
    /// Pre-flight errors (`PolicyViolation` for unadmitted plans,
    /// `ResourceExhausted` while the circuit is open) reject the plan
    /// outright; everything that happens mid-run lands in the report.
    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport> {
        if !plan.is_admitted() {
            let violations = plan
                .verdict
                .as_ref()
                .map(|v| v.violations.clone())
                .unwrap_or_else(|| vec!["plan was never validated".to_string()]);
            return Err(MaestroError::PolicyViolation { violations });
        }
        if self.circuit.is_open() {
            return Err(MaestroError::ResourceExhausted(
                "circuit open; cooling down after repeated failures".to_string(),
            ));
        }

        self.budget.start_plan();
        self.recovery.reset_plan();
        let started = Instant::now();
        info!(plan_id = %plan.id, steps = plan.steps.len(), "Executing plan");

        let mut results: Vec<StepResult> = Vec::new();
        let mut outcome = PlanOutcome::Success;
        let mut reason: Option<String> = None;

        for step in &plan.steps {
            self.emit(ExecutionEvent::StepStarted {
                plan_id: plan.id,
                step_id: step.id,
                tool: step.tool.clone(),
                timestamp: Timestamp::now(),
            });

            match self.run_step(plan, step).await {
                StepFlow::Done(result) => {
                    self.audit_step(plan.id, &result);
                    let success = result.success;
                    if !success {
                        let error = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "step failed".to_string());
                        self.snapshot(plan.id, Some(step.id), &error).await;
                    }
                    results.push(result);

                    if success {
                        self.circuit.record_success();
                        continue;
                    }

                    if self.circuit.record_failure() {
                        outcome = PlanOutcome::Exhausted;
                        let msg =
                            "circuit opened after consecutive step failures".to_string();
                        self.emit(ExecutionEvent::PlanAborted {
                            plan_id: plan.id,
                            reason: msg.clone(),
                            timestamp: Timestamp::now(),
                        });
                        reason = Some(msg);
                        break;
                    }
                    if step.critical {
                        // Continuing on an inconsistent machine state
                        // compounds the damage; only non-critical steps
                        // let the plan move on.
                        outcome = PlanOutcome::Failed;
                        reason = Some(format!("critical step {} failed", step.id));
                        break;
                    }
                }
                StepFlow::Aborted { result, kind } => {
                    self.audit_step(plan.id, &result);
                    let msg = match &kind {
                        AbortKind::Authorization => {
                            "session expired or revoked".to_string()
                        }
                        AbortKind::Budget(why) => why.clone(),
                    };
                    self.snapshot(plan.id, Some(step.id), &msg).await;
                    results.push(result);
                    self.emit(ExecutionEvent::PlanAborted {
                        plan_id: plan.id,
                        reason: msg.clone(),
                        timestamp: Timestamp::now(),
                    });
                    outcome = match kind {
                        AbortKind::Authorization => PlanOutcome::Aborted,
                        AbortKind::Budget(_) => PlanOutcome::Exhausted,
                    };
                    reason = Some(msg);
                    break;
                }
                StepFlow::PauseTimeout(result) => {
                    self.audit_step(plan.id, &result);
                    let msg = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "environment locked".to_string());
                    self.snapshot(plan.id, Some(step.id), &msg).await;
                    results.push(result);
                    // Marked Failed exactly once, at the timeout.
                    outcome = PlanOutcome::Failed;
                    reason = Some(msg);
                    break;
                }
            }
        }

        self.emit(ExecutionEvent::PlanFinished {
            plan_id: plan.id,
            outcome,
            timestamp: Timestamp::now(),
        });
        info!(plan_id = %plan.id, outcome = %outcome, "Plan finished");

        Ok(ExecutionReport {
            plan_id: plan.id,
            outcome,
            reason,
            steps: results,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn run_step(&self, plan: &Plan, step: &Step) -> StepFlow {
        let started = Instant::now();
        let step_deadline = started + Duration::from_secs(step.timeout_secs);
        let attempt_timeout = Duration::from_secs(self.config.attempt_timeout_secs);

        let app_key = self.app_key(step).await;
        let order = self.ranker.rank(&app_key);
        let candidates = self.registry.candidates_for(&step.tool, &order);

        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut last_kind: Option<StrategyKind> = None;

        if candidates.is_empty() {
            let result = self.failed_result(
                step,
                0,
                None,
                format!("no strategy supports tool '{}'", step.tool),
                started,
            );
            self.emit_step_failed(plan.id, step.id, &result);
            return StepFlow::Done(result);
        }

        let mut previous: Option<StrategyKind> = None;
        'candidates: for kind in candidates {
            if let Some(from) = previous {
                self.emit(ExecutionEvent::StepStrategySwitch {
                    plan_id: plan.id,
                    step_id: step.id,
                    from,
                    to: kind,
                    timestamp: Timestamp::now(),
                });
            }
            previous = Some(kind);
            last_kind = Some(kind);
            let Some(strategy) = self.registry.strategy(kind) else {
                continue;
            };

            let mut candidate_attempts: u32 = 0;
            loop {
                if candidate_attempts >= step.max_attempts {
                    continue 'candidates;
                }

                // Safety gate, not an optimization: a revoked or expired
                // session stops everything before the next action.
                if !self.session.check() {
                    let result = self.failed_result(
                        step,
                        attempts,
                        last_kind,
                        "session expired or revoked".to_string(),
                        started,
                    );
                    return StepFlow::Aborted {
                        result,
                        kind: AbortKind::Authorization,
                    };
                }
                if let Err(why) = self.budget.check() {
                    let result =
                        self.failed_result(step, attempts, last_kind, why.clone(), started);
                    return StepFlow::Aborted {
                        result,
                        kind: AbortKind::Budget(why),
                    };
                }
                if Instant::now() >= step_deadline {
                    last_error =
                        Some(format!("step timed out after {}s", step.timeout_secs));
                    break 'candidates;
                }

                self.budget.record_attempt(attempts > 0);
                attempts += 1;
                candidate_attempts += 1;

                let outcome =
                    match tokio::time::timeout(attempt_timeout, strategy.attempt(step)).await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => StrategyOutcome::failed(
                            FailureClass::Unknown,
                            format!(
                                "attempt timed out after {}s",
                                self.config.attempt_timeout_secs
                            ),
                        ),
                    };

                match outcome {
                    StrategyOutcome::Completed => {
                        let verification = match &step.verify {
                            Some(spec) => {
                                self.emit(ExecutionEvent::StepVerifying {
                                    plan_id: plan.id,
                                    step_id: step.id,
                                    strategy: kind,
                                    timestamp: Timestamp::now(),
                                });
                                let outcome = self.verifier.verify(spec).await;
                                if !outcome.success {
                                    // Completion without confirmed effect is
                                    // failure; same retry path as any other.
                                    self.ranker.record(&app_key, kind, false);
                                    last_error = Some(format!(
                                        "verification failed: {}",
                                        outcome
                                            .error
                                            .clone()
                                            .unwrap_or_else(|| "condition not met".to_string())
                                    ));
                                    continue;
                                }
                                Some(outcome)
                            }
                            None => None,
                        };

                        self.ranker.record(&app_key, kind, true);
                        let result = StepResult {
                            step_id: step.id,
                            success: true,
                            strategy_used: Some(kind),
                            attempts,
                            error: None,
                            duration_ms: started.elapsed().as_millis() as u64,
                            verification,
                        };
                        self.emit(ExecutionEvent::StepSucceeded {
                            plan_id: plan.id,
                            step_id: step.id,
                            strategy: kind,
                            attempts,
                            timestamp: Timestamp::now(),
                        });
                        return StepFlow::Done(result);
                    }
                    StrategyOutcome::Failed(failure) => {
                        last_error = Some(failure.detail.clone());
                        match failure.class {
                            FailureClass::EnvironmentLocked => {
                                match self.pause_until_clear(plan.id, step.id).await {
                                    PauseOutcome::Cleared => {
                                        // A locked attempt never really ran;
                                        // it does not consume the candidate's
                                        // budget.
                                        candidate_attempts -= 1;
                                        continue;
                                    }
                                    PauseOutcome::TimedOut => {
                                        let result = self.failed_result(
                                            step,
                                            attempts,
                                            Some(kind),
                                            format!(
                                                "environment locked: pause timeout after {}s",
                                                self.config.pause_timeout_secs
                                            ),
                                            started,
                                        );
                                        self.emit_step_failed(plan.id, step.id, &result);
                                        return StepFlow::PauseTimeout(result);
                                    }
                                    PauseOutcome::AuthorizationLost => {
                                        let result = self.failed_result(
                                            step,
                                            attempts,
                                            Some(kind),
                                            "session expired or revoked".to_string(),
                                            started,
                                        );
                                        return StepFlow::Aborted {
                                            result,
                                            kind: AbortKind::Authorization,
                                        };
                                    }
                                }
                            }
                            class if class.is_recoverable() => {
                                self.ranker.record(&app_key, kind, false);
                                if candidate_attempts < step.max_attempts
                                    && self.recovery.can_recover(class, step.id)
                                    && self.recovery.remediate(class, step).await
                                {
                                    // One same-strategy retry after
                                    // remediation, then fall through.
                                    continue;
                                }
                                continue 'candidates;
                            }
                            _ => {
                                self.ranker.record(&app_key, kind, false);
                                continue 'candidates;
                            }
                        }
                    }
                }
            }
        }

        let detail = last_error.unwrap_or_else(|| "no attempt produced a result".to_string());
        let result = self.failed_result(
            step,
            attempts,
            last_kind,
            format!("all strategies failed: {}", detail),
            started,
        );
        self.emit_step_failed(plan.id, step.id, &result);
        StepFlow::Done(result)
    }

    /// Wait for a locked environment to clear, bounded by the pause timeout.
    async fn pause_until_clear(&self, plan_id: PlanId, step_id: StepId) -> PauseOutcome {
        let deadline =
            Instant::now() + Duration::from_secs(self.config.pause_timeout_secs);
        warn!(plan_id = %plan_id, "Automation target locked; plan paused");
        self.emit(ExecutionEvent::PlanPaused {
            plan_id,
            step_id,
            reason: "automation target locked".to_string(),
            timestamp: Timestamp::now(),
        });

        loop {
            tokio::time::sleep(Duration::from_millis(self.config.pause_poll_ms)).await;
            if !self.session.check() {
                return PauseOutcome::AuthorizationLost;
            }
            if !self.desktop.is_locked().await {
                info!(plan_id = %plan_id, "Environment cleared; plan resumed");
                self.emit(ExecutionEvent::PlanResumed {
                    plan_id,
                    step_id,
                    timestamp: Timestamp::now(),
                });
                return PauseOutcome::Cleared;
            }
            if Instant::now() >= deadline {
                return PauseOutcome::TimedOut;
            }
        }
    }

    /// Key used for per-app strategy statistics.
    async fn app_key(&self, step: &Step) -> String {
        if let Some(app) = step.arg_str("app_name") {
            return app.to_lowercase();
        }
        if let Ok(Some(window)) = self.desktop.active_window().await {
            return window.process.to_lowercase();
        }
        "unknown".to_string()
    }

    fn failed_result(
        &self,
        step: &Step,
        attempts: u32,
        strategy: Option<StrategyKind>,
        error: String,
        started: Instant,
    ) -> StepResult {
        StepResult {
            step_id: step.id,
            success: false,
            strategy_used: strategy,
            attempts,
            error: Some(error),
            duration_ms: started.elapsed().as_millis() as u64,
            verification: None,
        }
    }

    fn emit_step_failed(&self, plan_id: PlanId, step_id: StepId, result: &StepResult) {
        self.emit(ExecutionEvent::StepFailed {
            plan_id,
            step_id,
            error: result
                .error
                .clone()
                .unwrap_or_else(|| "step failed".to_string()),
            timestamp: Timestamp::now(),
        });
    }

    fn emit(&self, event: ExecutionEvent) {
        {
            let mut ring = self.recent_events.lock().unwrap();
            if ring.len() == RECENT_EVENTS {
                ring.pop_front();
            }
            ring.push_back(event.event_name().to_string());
        }
        self.broadcaster.emit(event);
    }

    fn audit_step(&self, plan_id: PlanId, result: &StepResult) {
        if let Err(e) = self.audit.record(&AuditRecord::StepCompleted {
            plan_id,
            step_id: result.step_id,
            success: result.success,
            strategy: result.strategy_used,
            attempts: result.attempts,
            error: result.error.clone(),
        }) {
            warn!(error = %e, "Failed to audit step result");
        }
    }

    async fn snapshot(&self, plan_id: PlanId, step_id: Option<StepId>, error: &str) {
        let active_window = self.verifier.capture_state().await.map(|w| w.title);
        let recent_events: Vec<String> =
            self.recent_events.lock().unwrap().iter().cloned().collect();
        if let Err(e) = self.audit.record(&AuditRecord::Diagnostic {
            plan_id,
            step_id,
            active_window,
            error: error.to_string(),
            recent_events,
        }) {
            warn!(error = %e, "Failed to record diagnostic snapshot");
        }
    }
}
