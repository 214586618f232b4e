//! Append-only audit log with size-capped rotation.
//!
//! Every plan rejection, session mutation, and step outcome lands here as
//! one JSON line. The log is the system's tamper-evident memory: records
//! are appended, never rewritten.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use maestro_core::config::AuditConfig;
use maestro_core::types::{PlanId, SessionId, StepId, StrategyKind, Timestamp};

use crate::error::SafetyError;

/// One auditable occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRecord {
    PlanRejected {
        plan_id: PlanId,
        violations: Vec<String>,
    },
    SessionGranted {
        session_id: SessionId,
        expires_at: Timestamp,
        network_allowed: bool,
    },
    SessionRevoked {
        session_id: SessionId,
    },
    SessionExpired {
        session_id: SessionId,
    },
    StepCompleted {
        plan_id: PlanId,
        step_id: StepId,
        success: bool,
        strategy: Option<StrategyKind>,
        attempts: u32,
        error: Option<String>,
    },
    /// Diagnostic snapshot captured on step or plan failure.
    Diagnostic {
        plan_id: PlanId,
        step_id: Option<StepId>,
        active_window: Option<String>,
        error: String,
        recent_events: Vec<String>,
    },
}

#[derive(Serialize)]
struct Entry<'a> {
    at: Timestamp,
    #[serde(flatten)]
    record: &'a AuditRecord,
}

/// File-backed JSON-lines audit log.
///
/// Writes are serialized under one lock; rotation happens inline when the
/// file exceeds the configured size.
pub struct AuditLog {
    path: PathBuf,
    config: AuditConfig,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Create an audit log at the given path, creating parent directories.
    pub fn new(path: PathBuf, config: AuditConfig) -> Result<Self, SafetyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Append one record as a JSON line, rotating first if the log is full.
    pub fn record(&self, record: &AuditRecord) -> Result<(), SafetyError> {
        let _guard = self.write_lock.lock().unwrap();

        self.rotate_if_needed()?;

        let entry = Entry {
            at: Timestamp::now(),
            record,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back all lines from the active log file. Test/debug helper.
    pub fn read_lines(&self) -> Result<Vec<String>, SafetyError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }

    fn rotate_if_needed(&self) -> Result<(), SafetyError> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.config.max_bytes {
            return Ok(());
        }

        // Shift audit.jsonl.N-1 -> audit.jsonl.N, dropping the oldest.
        for i in (1..self.config.max_files).rev() {
            let from = self.rotated_path(i);
            if from.exists() {
                std::fs::rename(&from, self.rotated_path(i + 1))?;
            }
        }
        if self.config.max_files > 0 {
            std::fs::rename(&self.path, self.rotated_path(1))?;
        } else {
            std::fs::remove_file(&self.path)?;
        }
        tracing::debug!(path = %self.path.display(), "Audit log rotated");
        Ok(())
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }
}
