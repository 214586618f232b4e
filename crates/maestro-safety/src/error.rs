use maestro_core::MaestroError;
use thiserror::Error;

/// Errors raised by the safety layer.
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("Session store error: {0}")]
    Store(String),

    #[error("Audit log error: {0}")]
    Audit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SafetyError> for MaestroError {
    fn from(err: SafetyError) -> Self {
        match err {
            SafetyError::Store(msg) => MaestroError::Storage(msg),
            SafetyError::Audit(msg) => MaestroError::Audit(msg),
            SafetyError::Io(e) => MaestroError::Io(e),
            SafetyError::Serialization(e) => MaestroError::Serialization(e.to_string()),
        }
    }
}
