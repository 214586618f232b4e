//! File-backed session persistence with a backup copy.
//!
//! Every session mutation rewrites the record: the new state is written to
//! a temp file, the previous record rotates to `.bak`, and the temp file
//! renames into place. A corrupted primary is recovered from the backup;
//! a *missing* primary means "no session" and is never resurrected from
//! the backup.

use std::path::PathBuf;

use maestro_core::types::SessionGrant;
use tracing::warn;

use crate::error::SafetyError;

/// Stores the single active session record on disk.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Persist a grant, rotating the previous record to the backup.
    pub fn save(&self, grant: &SessionGrant) -> Result<(), SafetyError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        let json = serde_json::to_string_pretty(grant)?;
        std::fs::write(&tmp, json)?;

        if self.path.exists() {
            std::fs::rename(&self.path, self.backup_path())?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Remove the persisted record (revoke / expiry).
    ///
    /// The old record rotates to the backup for post-mortem inspection but
    /// is never loaded again as an active session.
    pub fn clear(&self) -> Result<(), SafetyError> {
        if self.path.exists() {
            std::fs::rename(&self.path, self.backup_path())?;
        }
        Ok(())
    }

    /// Load the persisted grant, if any.
    ///
    /// Falls back to the backup only when the primary exists but cannot be
    /// read or parsed (a corrupted write).
    pub fn load(&self) -> Option<SessionGrant> {
        if !self.path.exists() {
            return None;
        }
        match self.read_grant(&self.path) {
            Ok(grant) => Some(grant),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Session record corrupt; trying backup"
                );
                self.read_grant(&self.backup_path()).ok()
            }
        }
    }

    fn read_grant(&self, path: &std::path::Path) -> Result<SessionGrant, SafetyError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
