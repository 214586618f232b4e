//! The control surface exposed to request layers.
//!
//! Everything an outer shell (CLI, IPC, HTTP; all out of scope here) may
//! do goes through this facade: draft and validate a plan, approve it,
//! manage the session grant, execute, and observe events. Exactly one plan
//! executes at a time; the facade serializes execution because the input
//! and display surface being automated is a single physical resource.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use maestro_core::error::{MaestroError, Result};
use maestro_core::events::ExecutionEvent;
use maestro_core::types::{ExecutionReport, Plan, PlanId, SessionGrant, Verdict};
use maestro_executor::ReliableExecutor;
use maestro_safety::{PlanGuard, SessionAuthority};

/// Drafts a plan for a task. Implemented by the external planner.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn draft_plan(&self, task: &str) -> Result<Plan>;
}

/// Planner that replays a pre-built plan; used by the CLI (plans come from
/// a file) and by tests.
pub struct StaticPlanner {
    plan: Plan,
}

impl StaticPlanner {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn draft_plan(&self, task: &str) -> Result<Plan> {
        let mut plan = self.plan.clone();
        if !task.is_empty() {
            plan.task = task.to_string();
        }
        Ok(plan)
    }
}

/// Outcome of an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    Accepted,
    Rejected { reason: String },
}

struct PendingPlan {
    plan: Plan,
    approved: bool,
    created_at: Instant,
}

/// Facade tying admission, authorization, and execution together.
pub struct AutomationService {
    guard: PlanGuard,
    session: Arc<SessionAuthority>,
    executor: ReliableExecutor,
    planner: Arc<dyn Planner>,
    pending: Mutex<HashMap<PlanId, PendingPlan>>,
    pending_ttl: Duration,
    /// One plan at a time: the machine is an exclusive resource.
    exec_lock: tokio::sync::Mutex<()>,
}

impl AutomationService {
    pub fn new(
        guard: PlanGuard,
        session: Arc<SessionAuthority>,
        executor: ReliableExecutor,
        planner: Arc<dyn Planner>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            guard,
            session,
            executor,
            planner,
            pending: Mutex::new(HashMap::new()),
            pending_ttl,
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Draft a plan for the task and run admission on it.
    ///
    /// The plan is held for approval until the unapproved-plan TTL elapses.
    pub async fn preview_plan(&self, task: &str) -> Result<(Plan, Verdict)> {
        self.purge_expired();
        let mut plan = self.planner.draft_plan(task).await?;
        let verdict = self.guard.validate(&plan);
        plan.verdict = Some(verdict.clone());
        info!(plan_id = %plan.id, admitted = verdict.admitted, "Plan previewed");

        self.pending.lock().unwrap().insert(
            plan.id,
            PendingPlan {
                plan: plan.clone(),
                approved: false,
                created_at: Instant::now(),
            },
        );
        Ok((plan, verdict))
    }

    /// Approve a previously previewed plan.
    ///
    /// Rejected plans can never be approved; a policy change and a new
    /// preview are required.
    pub fn approve_plan(&self, plan_id: PlanId) -> Approval {
        self.purge_expired();
        let mut pending = self.pending.lock().unwrap();
        let Some(entry) = pending.get_mut(&plan_id) else {
            return Approval::Rejected {
                reason: "unknown or expired plan".to_string(),
            };
        };
        if !entry.plan.is_admitted() {
            let reason = entry
                .plan
                .verdict
                .as_ref()
                .map(|v| v.violations.join("; "))
                .unwrap_or_else(|| "plan was never validated".to_string());
            return Approval::Rejected { reason };
        }
        entry.approved = true;
        info!(plan_id = %plan_id, "Plan approved");
        Approval::Accepted
    }

    /// Execute an approved plan. The plan is discarded afterwards.
    pub async fn execute_plan(&self, plan_id: PlanId) -> Result<ExecutionReport> {
        self.purge_expired();
        let plan = {
            let mut pending = self.pending.lock().unwrap();
            let approved = match pending.get(&plan_id) {
                Some(entry) => entry.approved,
                None => {
                    return Err(MaestroError::PolicyViolation {
                        violations: vec![format!("unknown or expired plan {}", plan_id)],
                    });
                }
            };
            if !approved {
                return Err(MaestroError::PolicyViolation {
                    violations: vec![format!("plan {} has not been approved", plan_id)],
                });
            }
            match pending.remove(&plan_id) {
                Some(entry) => entry.plan,
                None => {
                    return Err(MaestroError::PolicyViolation {
                        violations: vec![format!("unknown or expired plan {}", plan_id)],
                    });
                }
            }
        };

        let _serialized = self.exec_lock.lock().await;
        self.executor.execute(&plan).await
    }

    /// Issue a session grant.
    pub fn grant_session(
        &self,
        ttl: Option<Duration>,
        apps: Vec<String>,
        folders: Vec<PathBuf>,
        network_allowed: bool,
    ) -> Result<SessionGrant> {
        Ok(self.session.grant(ttl, apps, folders, network_allowed)?)
    }

    /// Revoke the current session grant, if any.
    pub fn revoke_session(&self) -> Result<()> {
        Ok(self.session.revoke()?)
    }

    /// The current grant, if one is live.
    pub fn session_status(&self) -> Option<SessionGrant> {
        if self.session.check() {
            self.session.current()
        } else {
            None
        }
    }

    /// Subscribe to the execution event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.executor.subscribe()
    }

    fn purge_expired(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.retain(|_, entry| entry.created_at.elapsed() < self.pending_ttl);
    }
}
