use thiserror::Error;

/// Top-level error type for the Maestro system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for MaestroError` so that the `?` operator works
/// seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MaestroError {
    /// PlanGuard rejected the plan. Never executed, never auto-retried;
    /// carries every violated rule.
    #[error("Plan rejected with {} violation(s): {}", violations.len(), violations.join("; "))]
    PolicyViolation { violations: Vec<String> },

    /// The session expired or was revoked mid-run. Aborts execution and is
    /// never silently retried.
    #[error("Authorization expired or revoked: {0}")]
    AuthorizationExpired(String),

    /// A single strategy attempt failed. Handled locally (retry/fallback)
    /// unless all candidates are exhausted.
    #[error("Strategy attempt failed: {0}")]
    StrategyAttempt(String),

    /// Post-condition verification failed; treated like an attempt failure.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The automation target is temporarily inaccessible. Pauses the plan,
    /// not a failure.
    #[error("Environment blocked: {0}")]
    EnvironmentBlocked(String),

    /// Circuit open or budget exceeded. Terminal and systemic, distinct
    /// from ordinary step failure; requires a cool-down.
    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Invalid configuration. Fatal at startup, never per-step.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MaestroError {
    fn from(err: toml::de::Error) -> Self {
        MaestroError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MaestroError {
    fn from(err: toml::ser::Error) -> Self {
        MaestroError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MaestroError {
    fn from(err: serde_json::Error) -> Self {
        MaestroError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Maestro operations.
pub type Result<T> = std::result::Result<T, MaestroError>;
