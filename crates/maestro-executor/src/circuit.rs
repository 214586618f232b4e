//! Circuit breaker over consecutive step failures.
//!
//! Repeated failures usually mean the machine is in a state the planner
//! never anticipated; continuing compounds the damage. Reaching the
//! threshold opens the circuit: the current plan aborts and no new plan
//! starts until the cool-down elapses. Reset is lazy, observed on the next
//! `is_open` call.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use maestro_core::types::Timestamp;

struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_wall: Option<Timestamp>,
}

/// Transient snapshot of the breaker, for status reporting.
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub open: bool,
    pub opened_at: Option<Timestamp>,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                opened_at: None,
                opened_wall: None,
            }),
        }
    }

    /// Whether the circuit is open right now.
    ///
    /// An elapsed cool-down closes the circuit and clears the counter.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.opened_at {
            Some(opened) if opened.elapsed() >= self.cooldown => {
                info!("Circuit cool-down elapsed; closing");
                inner.opened_at = None;
                inner.opened_wall = None;
                inner.consecutive_failures = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// A step succeeded; the failure streak is over.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
    }

    /// A step failed. Returns `true` when this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.threshold && inner.opened_at.is_none() {
            inner.opened_at = Some(Instant::now());
            inner.opened_wall = Some(Timestamp::now());
            warn!(
                failures = inner.consecutive_failures,
                "Circuit opened after consecutive failures"
            );
            return true;
        }
        false
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().unwrap();
        CircuitState {
            consecutive_failures: inner.consecutive_failures,
            open: inner.opened_at.is_some(),
            opened_at: inner.opened_wall,
        }
    }
}
