//! Reliable multi-strategy execution engine for Maestro.
//!
//! Runs admitted plans step by step: ranked strategy selection,
//! post-condition verification, classified recovery with bounded retries,
//! a circuit breaker over consecutive failures, and non-blocking progress
//! fan-out. Authorization is re-checked at every step boundary.

pub mod broadcast;
pub mod budget;
pub mod circuit;
pub mod desktop;
pub mod executor;
pub mod ranker;
pub mod recovery;
pub mod strategy;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::EventBroadcaster;
pub use budget::ExecutionBudget;
pub use circuit::CircuitBreaker;
pub use desktop::{Desktop, DesktopError, DryRunDesktop, WindowInfo};
pub use executor::ReliableExecutor;
pub use ranker::StrategyRanker;
pub use recovery::{RecoveryManager, RecoveryPolicy};
pub use strategy::{AttemptFailure, Strategy, StrategyOutcome, StrategyRegistry};
pub use verify::Verifier;
