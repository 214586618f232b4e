use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MaestroError, Result};

/// Top-level configuration for the Maestro automation core.
///
/// Loaded from `~/.maestro/config.toml` by default. Each section corresponds
/// to one subsystem; all values have working defaults so a missing file is
/// never fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaestroConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl MaestroConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MaestroConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MaestroError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject configurations that cannot produce a working system.
    ///
    /// Invalid configuration is fatal at startup, never per-step.
    pub fn validate(&self) -> Result<()> {
        if self.guard.max_steps == 0 {
            return Err(MaestroError::Config(
                "guard.max_steps must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ranker.learning_rate) {
            return Err(MaestroError::Config(format!(
                "ranker.learning_rate must be within [0, 1], got {}",
                self.ranker.learning_rate
            )));
        }
        if self.executor.circuit_threshold == 0 {
            return Err(MaestroError::Config(
                "executor.circuit_threshold must be at least 1".to_string(),
            ));
        }
        if self.session.default_ttl_secs == 0 {
            return Err(MaestroError::Config(
                "session.default_ttl_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the session record and audit log.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.maestro/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Static admission policy enforced by PlanGuard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Maximum steps per plan (runaway prevention).
    pub max_steps: usize,
    /// Tools the executor is allowed to run. Unknown tools are denied.
    pub allowed_tools: Vec<String>,
    /// Applications a plan may open or focus.
    pub trusted_apps: Vec<String>,
    /// Applications that are always rejected, regardless of trust.
    pub blocked_apps: Vec<String>,
    /// Alias table applied before the trust check (e.g. "edge" -> "msedge").
    pub app_aliases: HashMap<String, String>,
    /// Domain suffixes network tools may target. Raw IP literals are always
    /// rejected.
    pub trusted_domains: Vec<String>,
    /// Roots under which filesystem parameters must fall.
    pub permitted_roots: Vec<String>,
    /// Cap on the sum of per-step attempt bounds.
    pub max_total_attempts: u32,
    /// High-risk steps allowed per plan without explicit approval.
    pub max_high_risk_steps: usize,
    /// Require a verify spec on every step not marked unverifiable.
    pub require_verification: bool,
    /// How long an unapproved plan stays eligible for approval.
    pub pending_plan_ttl_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            allowed_tools: vec![
                // Pointer
                "click".to_string(),
                "double_click".to_string(),
                "right_click".to_string(),
                "scroll".to_string(),
                "drag".to_string(),
                // Keyboard
                "type".to_string(),
                "keypress".to_string(),
                // Windows and processes
                "open_app".to_string(),
                "focus_app".to_string(),
                "focus_window".to_string(),
                // Navigation
                "open_url".to_string(),
                // Utility
                "wait".to_string(),
                // Files
                "save_file".to_string(),
                "open_file".to_string(),
            ],
            trusted_apps: vec![
                "notepad".to_string(),
                "chrome".to_string(),
                "vscode".to_string(),
                "explorer".to_string(),
                "terminal".to_string(),
            ],
            blocked_apps: vec![
                "regedit".to_string(),
                "cmd".to_string(),
                "powershell".to_string(),
                "taskmgr".to_string(),
                "mmc".to_string(),
                "gpedit".to_string(),
            ],
            app_aliases: HashMap::from([
                ("code".to_string(), "vscode".to_string()),
                ("google chrome".to_string(), "chrome".to_string()),
                ("files".to_string(), "explorer".to_string()),
            ]),
            trusted_domains: vec![
                "example.com".to_string(),
                "wikipedia.org".to_string(),
            ],
            permitted_roots: vec![
                "~/Documents".to_string(),
                "~/Downloads".to_string(),
                "~/Desktop".to_string(),
            ],
            max_total_attempts: 20,
            max_high_risk_steps: 0,
            require_verification: true,
            pending_plan_ttl_secs: 600,
        }
    }
}

/// Session authorization defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Grant lifetime when the caller does not specify one.
    pub default_ttl_secs: u64,
    /// Apps granted when the caller passes an empty set.
    pub default_apps: Vec<String>,
    /// Folders granted when the caller passes an empty set.
    pub default_folders: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30 * 60,
            default_apps: vec![
                "notepad".to_string(),
                "chrome".to_string(),
                "vscode".to_string(),
            ],
            default_folders: vec!["~/Documents".to_string(), "~/Downloads".to_string()],
        }
    }
}

/// Execution engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wall-clock bound for a single strategy attempt.
    pub attempt_timeout_secs: u64,
    /// Consecutive step failures that open the circuit.
    pub circuit_threshold: u32,
    /// Cool-down before the circuit closes again.
    pub circuit_cooldown_secs: u64,
    /// How long a plan may stay paused on a locked environment.
    pub pause_timeout_secs: u64,
    /// Polling interval while paused.
    pub pause_poll_ms: u64,
    /// Verifier polling interval.
    pub verify_poll_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 30,
            circuit_threshold: 3,
            circuit_cooldown_secs: 60,
            pause_timeout_secs: 120,
            pause_poll_ms: 500,
            verify_poll_ms: 500,
        }
    }
}

/// Strategy ranking parameters.
///
/// The update rule is policy, not a fixed formula: both the EWMA weight and
/// the sample gate are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// EWMA weight given to the newest outcome.
    pub learning_rate: f64,
    /// Attempts required before the learned order overrides the default.
    pub min_samples: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.2,
            min_samples: 5,
        }
    }
}

/// Per-plan runaway protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum strategy attempts in a single plan.
    pub max_actions_per_plan: u32,
    /// Maximum retries (attempts beyond the first per step) in a plan.
    pub max_retries_per_plan: u32,
    /// Maximum plan runtime in seconds.
    pub max_runtime_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_actions_per_plan: 50,
            max_retries_per_plan: 20,
            max_runtime_secs: 180,
        }
    }
}

/// Audit log sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Rotate the log once it exceeds this size.
    pub max_bytes: u64,
    /// Rotated files kept (audit.jsonl.1 .. audit.jsonl.N).
    pub max_files: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            max_files: 3,
        }
    }
}
