//! Per-plan runaway protection.
//!
//! Bounds the total attempts, retries, and wall-clock time a single plan
//! may consume. Exceeding any cap is systemic (`ResourceExhausted`), not a
//! per-step failure.

use std::sync::Mutex;
use std::time::Instant;

use maestro_core::config::BudgetConfig;

struct Inner {
    actions: u32,
    retries: u32,
    started: Instant,
}

/// Tracks and enforces the per-plan budgets.
pub struct ExecutionBudget {
    config: BudgetConfig,
    inner: Mutex<Inner>,
}

impl ExecutionBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                actions: 0,
                retries: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Reset the counters for a new plan.
    pub fn start_plan(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.actions = 0;
        inner.retries = 0;
        inner.started = Instant::now();
    }

    /// Check every budget; an `Err` carries the human-readable reason.
    pub fn check(&self) -> Result<(), String> {
        let inner = self.inner.lock().unwrap();
        if inner.actions >= self.config.max_actions_per_plan {
            return Err(format!(
                "action budget exhausted: {} of {} attempts used",
                inner.actions, self.config.max_actions_per_plan
            ));
        }
        if inner.retries >= self.config.max_retries_per_plan {
            return Err(format!(
                "retry budget exhausted: {} of {} retries used",
                inner.retries, self.config.max_retries_per_plan
            ));
        }
        let elapsed = inner.started.elapsed().as_secs();
        if elapsed >= self.config.max_runtime_secs {
            return Err(format!(
                "runtime budget exhausted: {}s of {}s used",
                elapsed, self.config.max_runtime_secs
            ));
        }
        Ok(())
    }

    /// Record one strategy attempt.
    pub fn record_attempt(&self, was_retry: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.actions += 1;
        if was_retry {
            inner.retries += 1;
        }
    }

    /// (actions, retries) used so far.
    pub fn used(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap();
        (inner.actions, inner.retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(actions: u32, retries: u32, runtime: u64) -> ExecutionBudget {
        ExecutionBudget::new(BudgetConfig {
            max_actions_per_plan: actions,
            max_retries_per_plan: retries,
            max_runtime_secs: runtime,
        })
    }

    #[test]
    fn test_fresh_budget_passes() {
        let b = budget(10, 5, 60);
        b.start_plan();
        assert!(b.check().is_ok());
    }

    #[test]
    fn test_action_cap() {
        let b = budget(2, 10, 60);
        b.start_plan();
        b.record_attempt(false);
        assert!(b.check().is_ok());
        b.record_attempt(false);
        let err = b.check().unwrap_err();
        assert!(err.contains("action budget exhausted"));
    }

    #[test]
    fn test_retry_cap() {
        let b = budget(100, 1, 60);
        b.start_plan();
        b.record_attempt(false);
        b.record_attempt(true);
        let err = b.check().unwrap_err();
        assert!(err.contains("retry budget exhausted"));
    }

    #[test]
    fn test_runtime_cap() {
        let b = budget(100, 100, 0);
        b.start_plan();
        let err = b.check().unwrap_err();
        assert!(err.contains("runtime budget exhausted"));
    }

    #[test]
    fn test_start_plan_resets() {
        let b = budget(1, 1, 60);
        b.start_plan();
        b.record_attempt(true);
        assert!(b.check().is_err());

        b.start_plan();
        assert!(b.check().is_ok());
        assert_eq!(b.used(), (0, 0));
    }
}
