//! Session-scoped authorization.
//!
//! Every automation run requires an explicit, time-boxed grant. The grant
//! is re-checked at every step boundary, expires lazily when its deadline
//! is observed, and can be revoked instantly. State machine:
//!
//! `NoSession --grant--> Active(expires_at) --[deadline | revoke]--> NoSession`
//!
//! All mutations are serialized under one lock so an expiring grant and a
//! concurrent new grant cannot interleave into an inconsistent scope. A new
//! grant overwrites the previous one (last-writer-wins). Every mutation is
//! persisted through [`SessionStore`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use maestro_core::config::SessionConfig;
use maestro_core::types::{SessionGrant, SessionId, Timestamp};

use crate::audit::{AuditLog, AuditRecord};
use crate::error::SafetyError;
use crate::paths;
use crate::store::SessionStore;

/// Issues and continuously validates the single authorization grant.
pub struct SessionAuthority {
    config: SessionConfig,
    store: SessionStore,
    audit: Arc<AuditLog>,
    state: Mutex<Option<SessionGrant>>,
}

impl SessionAuthority {
    /// Create the authority, resuming a persisted grant if it is still live.
    pub fn new(config: SessionConfig, store: SessionStore, audit: Arc<AuditLog>) -> Self {
        let resumed = store.load().filter(|grant| {
            if grant.is_expired() {
                info!(session_id = ?grant.session_id, "Persisted session already expired; discarding");
                false
            } else {
                true
            }
        });
        if let Some(grant) = &resumed {
            info!(
                session_id = ?grant.session_id,
                expires_at = grant.expires_at.0,
                "Resumed persisted session"
            );
        }
        Self {
            config,
            store,
            audit,
            state: Mutex::new(resumed),
        }
    }

    /// Issue a new grant, replacing any existing one.
    ///
    /// Empty app/folder sets fall back to the configured defaults.
    pub fn grant(
        &self,
        ttl: Option<Duration>,
        apps: Vec<String>,
        folders: Vec<PathBuf>,
        network_allowed: bool,
    ) -> Result<SessionGrant, SafetyError> {
        let ttl_secs = ttl
            .map(|d| d.as_secs())
            .unwrap_or(self.config.default_ttl_secs);

        let allowed_apps: HashSet<String> = if apps.is_empty() {
            self.config
                .default_apps
                .iter()
                .map(|a| a.to_lowercase())
                .collect()
        } else {
            apps.into_iter().map(|a| a.to_lowercase()).collect()
        };

        let allowed_folders: Vec<PathBuf> = if folders.is_empty() {
            self.config
                .default_folders
                .iter()
                .map(|f| paths::expand_home(f))
                .collect()
        } else {
            folders
        };

        let now = Timestamp::now();
        let grant = SessionGrant {
            session_id: SessionId::new(),
            granted_at: now,
            expires_at: Timestamp(now.0 + ttl_secs as i64),
            allowed_apps,
            allowed_folders,
            network_allowed,
        };

        let mut state = self.state.lock().unwrap();
        self.store.save(&grant)?;
        self.audit.record(&AuditRecord::SessionGranted {
            session_id: grant.session_id,
            expires_at: grant.expires_at,
            network_allowed,
        })?;
        info!(
            session_id = ?grant.session_id,
            ttl_secs,
            network_allowed,
            "Session granted"
        );
        *state = Some(grant.clone());
        Ok(grant)
    }

    /// Whether a live grant exists right now.
    ///
    /// Observing an elapsed deadline transitions Active -> NoSession before
    /// returning, so callers never act on a stale grant.
    pub fn check(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.as_ref() {
            None => false,
            Some(grant) if grant.is_expired() => {
                let session_id = grant.session_id;
                *state = None;
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear expired session record");
                }
                if let Err(e) = self
                    .audit
                    .record(&AuditRecord::SessionExpired { session_id })
                {
                    warn!(error = %e, "Failed to audit session expiry");
                }
                info!(session_id = ?session_id, "Session expired");
                false
            }
            Some(_) => true,
        }
    }

    /// Revoke the current grant. A no-op when no session is active.
    pub fn revoke(&self) -> Result<(), SafetyError> {
        let mut state = self.state.lock().unwrap();
        let Some(grant) = state.take() else {
            return Ok(());
        };
        self.store.clear()?;
        self.audit.record(&AuditRecord::SessionRevoked {
            session_id: grant.session_id,
        })?;
        info!(session_id = ?grant.session_id, "Session revoked");
        Ok(())
    }

    /// Seconds until the current grant expires; zero when there is none.
    pub fn time_remaining(&self) -> Duration {
        let state = self.state.lock().unwrap();
        match state.as_ref() {
            Some(grant) => {
                let remaining = grant.expires_at.0 - Timestamp::now().0;
                Duration::from_secs(remaining.max(0) as u64)
            }
            None => Duration::ZERO,
        }
    }

    /// Push the current grant's deadline out. No-op without a live grant.
    pub fn extend(&self, additional: Duration) -> Result<(), SafetyError> {
        let mut state = self.state.lock().unwrap();
        let Some(grant) = state.as_mut() else {
            return Ok(());
        };
        if grant.is_expired() {
            return Ok(());
        }
        grant.expires_at = Timestamp(grant.expires_at.0 + additional.as_secs() as i64);
        self.store.save(grant)?;
        info!(
            session_id = ?grant.session_id,
            expires_at = grant.expires_at.0,
            "Session extended"
        );
        Ok(())
    }

    /// Whether an application is inside the granted scope.
    pub fn is_app_allowed(&self, app_name: &str) -> bool {
        let state = self.state.lock().unwrap();
        match state.as_ref() {
            Some(grant) if !grant.is_expired() => {
                grant.allowed_apps.contains(&app_name.to_lowercase())
            }
            _ => false,
        }
    }

    /// Whether a folder is inside the granted scope.
    ///
    /// Both sides are normalized lexically; traversal attempts fail closed.
    pub fn is_folder_allowed(&self, folder: &Path) -> bool {
        let Some(normalized) = paths::normalize(folder) else {
            return false;
        };
        let state = self.state.lock().unwrap();
        match state.as_ref() {
            Some(grant) if !grant.is_expired() => grant.allowed_folders.iter().any(|root| {
                paths::normalize(root)
                    .map(|r| paths::is_within(&normalized, &r))
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }

    /// Whether network actions are permitted.
    pub fn is_network_allowed(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.as_ref() {
            Some(grant) if !grant.is_expired() => grant.network_allowed,
            _ => false,
        }
    }

    /// Snapshot of the current grant, if any.
    pub fn current(&self) -> Option<SessionGrant> {
        self.state.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::config::AuditConfig;

    fn authority(dir: &Path) -> SessionAuthority {
        let audit = Arc::new(
            AuditLog::new(dir.join("audit.jsonl"), AuditConfig::default()).unwrap(),
        );
        SessionAuthority::new(
            SessionConfig::default(),
            SessionStore::new(dir.join("session.json")),
            audit,
        )
    }

    #[test]
    fn test_no_session_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        assert!(!auth.check());
        assert_eq!(auth.time_remaining(), Duration::ZERO);
        assert!(!auth.is_network_allowed());
    }

    #[test]
    fn test_grant_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());

        let grant = auth
            .grant(
                Some(Duration::from_secs(300)),
                vec!["Notepad".to_string()],
                vec![],
                true,
            )
            .unwrap();

        assert!(auth.check());
        assert!(auth.is_app_allowed("notepad"));
        assert!(auth.is_app_allowed("NOTEPAD"));
        assert!(!auth.is_app_allowed("regedit"));
        assert!(auth.is_network_allowed());
        assert!(auth.time_remaining() <= Duration::from_secs(300));
        assert!(auth.time_remaining() > Duration::from_secs(290));
        assert!(!grant.is_expired());
    }

    #[test]
    fn test_expired_grant_transitions_to_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());

        auth.grant(Some(Duration::ZERO), vec![], vec![], false)
            .unwrap();
        // TTL of zero expires immediately; check() observes the deadline.
        assert!(!auth.check());
        assert!(auth.current().is_none());
        // The persisted record was cleared, not left behind.
        let store = SessionStore::new(dir.path().join("session.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_revoke_is_instant() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());

        auth.grant(Some(Duration::from_secs(300)), vec![], vec![], false)
            .unwrap();
        assert!(auth.check());

        auth.revoke().unwrap();
        assert!(!auth.check());
        assert!(!auth.is_app_allowed("notepad"));
    }

    #[test]
    fn test_revoke_without_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        // No exception, no corrupted persisted state.
        auth.revoke().unwrap();
        auth.revoke().unwrap();
        assert!(!auth.check());
        assert!(SessionStore::new(dir.path().join("session.json"))
            .load()
            .is_none());
    }

    #[test]
    fn test_new_grant_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());

        auth.grant(
            Some(Duration::from_secs(300)),
            vec!["notepad".to_string()],
            vec![],
            false,
        )
        .unwrap();
        auth.grant(
            Some(Duration::from_secs(300)),
            vec!["chrome".to_string()],
            vec![],
            true,
        )
        .unwrap();

        // Last writer wins: the old scope is gone.
        assert!(!auth.is_app_allowed("notepad"));
        assert!(auth.is_app_allowed("chrome"));
        assert!(auth.is_network_allowed());
    }

    #[test]
    fn test_empty_scope_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        auth.grant(None, vec![], vec![], false).unwrap();
        // SessionConfig defaults include notepad and chrome.
        assert!(auth.is_app_allowed("notepad"));
        assert!(auth.is_app_allowed("chrome"));
    }

    #[test]
    fn test_folder_scope_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        auth.grant(
            Some(Duration::from_secs(300)),
            vec![],
            vec![PathBuf::from("/home/user/Documents")],
            false,
        )
        .unwrap();

        assert!(auth.is_folder_allowed(Path::new("/home/user/Documents/notes")));
        assert!(auth.is_folder_allowed(Path::new(
            "/home/user/Documents/a/../b"
        )));
        assert!(!auth.is_folder_allowed(Path::new("/home/user/Downloads")));
        assert!(!auth.is_folder_allowed(Path::new(
            "/home/user/Documents/../../../etc"
        )));
        assert!(!auth.is_folder_allowed(Path::new("relative/path")));
    }

    #[test]
    fn test_grant_persists_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let auth = authority(dir.path());
            auth.grant(
                Some(Duration::from_secs(600)),
                vec!["vscode".to_string()],
                vec![],
                false,
            )
            .unwrap();
        }
        // A new authority over the same store resumes the live grant.
        let auth = authority(dir.path());
        assert!(auth.check());
        assert!(auth.is_app_allowed("vscode"));
    }

    #[test]
    fn test_extend_pushes_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        auth.grant(Some(Duration::from_secs(100)), vec![], vec![], false)
            .unwrap();

        auth.extend(Duration::from_secs(500)).unwrap();
        assert!(auth.time_remaining() > Duration::from_secs(500));
    }

    #[test]
    fn test_grant_and_revoke_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authority(dir.path());
        auth.grant(Some(Duration::from_secs(300)), vec![], vec![], false)
            .unwrap();
        auth.revoke().unwrap();

        let audit =
            AuditLog::new(dir.path().join("audit.jsonl"), AuditConfig::default()).unwrap();
        let lines = audit.read_lines().unwrap();
        assert!(lines.iter().any(|l| l.contains("session_granted")));
        assert!(lines.iter().any(|l| l.contains("session_revoked")));
    }
}
