use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The closed set of automation strategies.
///
/// Every strategy the system can ever use appears here; there is no runtime
/// strategy discovery. The registry in `maestro-executor` maps each variant
/// to its implementation and its supported tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Structural accessibility-tree automation (element queries).
    Accessibility,
    /// Visual recognition (on-screen text / template lookup).
    Vision,
    /// Raw coordinate replay.
    CoordReplay,
    /// Process-level control (launch, focus, open URL).
    Process,
}

impl StrategyKind {
    /// All variants, in declaration order.
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Accessibility,
        StrategyKind::Vision,
        StrategyKind::CoordReplay,
        StrategyKind::Process,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Accessibility => write!(f, "accessibility"),
            StrategyKind::Vision => write!(f, "vision"),
            StrategyKind::CoordReplay => write!(f, "coord_replay"),
            StrategyKind::Process => write!(f, "process"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accessibility" => Ok(StrategyKind::Accessibility),
            "vision" => Ok(StrategyKind::Vision),
            "coord_replay" => Ok(StrategyKind::CoordReplay),
            "process" => Ok(StrategyKind::Process),
            _ => Err(format!("Unknown strategy kind: {}", s)),
        }
    }
}

/// The static default strategy order, used until an app has enough samples
/// for the learned order to be trusted.
pub const DEFAULT_STRATEGY_ORDER: [StrategyKind; 4] = [
    StrategyKind::Accessibility,
    StrategyKind::Vision,
    StrategyKind::Process,
    StrategyKind::CoordReplay,
];

/// Classification of a failed strategy attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// A modal dialog is covering the target.
    BlockingDialog,
    /// The expected window lost focus to another one.
    FocusStolen,
    /// The target element could not be located.
    TargetNotFound,
    /// The automation target is temporarily inaccessible (locked screen,
    /// secure desktop). Pauses the plan instead of failing it.
    EnvironmentLocked,
    Unknown,
}

impl FailureClass {
    /// Whether the class supports remediation followed by a retry.
    ///
    /// `EnvironmentLocked` is handled by the executor's pause flow and is
    /// deliberately not remediable here.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FailureClass::BlockingDialog | FailureClass::FocusStolen | FailureClass::TargetNotFound
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::BlockingDialog => write!(f, "blocking_dialog"),
            FailureClass::FocusStolen => write!(f, "focus_stolen"),
            FailureClass::TargetNotFound => write!(f, "target_not_found"),
            FailureClass::EnvironmentLocked => write!(f, "environment_locked"),
            FailureClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Risk classification assigned to a step by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Post-condition check kinds supported by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyKind {
    /// Active window title contains the value.
    WindowTitleContains,
    /// The value is visible somewhere on screen.
    TextVisible,
    /// A process with the given name is running.
    ProcessRunning,
    /// A UI element matching the selector exists.
    ElementExists,
}

/// Terminal outcome of a plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
    /// Every critical step succeeded.
    Success,
    /// A critical step failed (or the pause timeout elapsed).
    Failed,
    /// Authorization was lost mid-run; remaining steps never ran.
    Aborted,
    /// The circuit opened or a budget cap was hit; systemic, not per-step.
    Exhausted,
}

impl fmt::Display for PlanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOutcome::Success => write!(f, "success"),
            PlanOutcome::Failed => write!(f, "failed"),
            PlanOutcome::Aborted => write!(f, "aborted"),
            PlanOutcome::Exhausted => write!(f, "exhausted"),
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Unique identifier for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a step within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an authorization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Post-condition specification attached to a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySpec {
    pub kind: VerifyKind,
    /// Expected value: title fragment, visible text, process name, selector.
    pub value: String,
    /// Polling deadline in seconds.
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,
    /// Invert the condition (e.g. "window X is gone").
    #[serde(default)]
    pub negate: bool,
}

fn default_verify_timeout() -> u64 {
    5
}

/// Outcome of a verification run, kept as evidence on the step result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub expected: String,
    /// What was actually observed when the check resolved.
    pub observed: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// One tool invocation with parameters; the unit of execution and retry.
///
/// Steps are owned by their plan and never mutated after admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: StepId,
    pub tool: String,
    /// Tool parameters as a JSON object.
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
    #[serde(default)]
    pub description: String,
    /// Post-condition check. Required by policy unless `unverifiable`.
    #[serde(default)]
    pub verify: Option<VerifySpec>,
    /// Wall-clock bound for the whole step (all attempts).
    #[serde(default = "default_step_timeout")]
    pub timeout_secs: u64,
    /// Per-candidate attempt bound.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub risk: RiskLevel,
    /// Critical steps abort the remaining plan on failure; non-critical
    /// steps let it continue.
    #[serde(default = "default_true")]
    pub critical: bool,
    /// Explicitly marks a step as having no checkable post-condition.
    #[serde(default)]
    pub unverifiable: bool,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_step_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Step {
    /// Create a step with defaults for everything but tool and description.
    pub fn new(tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            tool: tool.into(),
            args: empty_args(),
            description: description.into(),
            verify: None,
            timeout_secs: default_step_timeout(),
            max_attempts: default_max_attempts(),
            risk: RiskLevel::default(),
            critical: true,
            unverifiable: false,
        }
    }

    pub fn with_arg(mut self, key: &str, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &mut self.args {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_verify(mut self, spec: VerifySpec) -> Self {
        self.verify = Some(spec);
        self
    }

    /// Fetch a string argument by key.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    /// Fetch an integer argument by key.
    pub fn arg_i64(&self, key: &str) -> Option<i64> {
        self.args.get(key).and_then(|v| v.as_i64())
    }
}

/// Admission verdict produced by PlanGuard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub admitted: bool,
    /// Every violated rule, so callers can fix policy instead of guessing.
    pub violations: Vec<String>,
}

impl Verdict {
    pub fn admitted() -> Self {
        Self {
            admitted: true,
            violations: Vec::new(),
        }
    }

    pub fn rejected(violations: Vec<String>) -> Self {
        Self {
            admitted: false,
            violations,
        }
    }
}

/// An ordered list of steps derived from a task.
///
/// Produced by the external planner; immutable after admission; discarded
/// after execution or after the unapproved-plan TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub id: PlanId,
    pub task: String,
    pub steps: Vec<Step>,
    /// Set by PlanGuard at admission time.
    #[serde(default)]
    pub verdict: Option<Verdict>,
}

impl Plan {
    pub fn new(task: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: PlanId::new(),
            task: task.into(),
            steps,
            verdict: None,
        }
    }

    /// Whether PlanGuard admitted the plan.
    pub fn is_admitted(&self) -> bool {
        self.verdict.as_ref().map(|v| v.admitted).unwrap_or(false)
    }
}

/// Result of executing one step (the whole attempt sequence).
///
/// Immutable once written; one audit line per result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub success: bool,
    pub strategy_used: Option<StrategyKind>,
    /// Total attempts across all candidate strategies.
    pub attempts: u32,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub verification: Option<VerificationResult>,
}

/// Terminal report for a plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: PlanId,
    pub outcome: PlanOutcome,
    /// Human-readable reason for non-success outcomes.
    pub reason: Option<String>,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
}

/// A time-boxed authorization grant.
///
/// Created on grant; removed by revoke (instant) or lazy expiry (observed
/// on read). Persisted with a backup copy on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub session_id: SessionId,
    pub granted_at: Timestamp,
    pub expires_at: Timestamp,
    pub allowed_apps: HashSet<String>,
    pub allowed_folders: Vec<PathBuf>,
    pub network_allowed: bool,
}

impl SessionGrant {
    /// Whether the grant deadline has elapsed.
    ///
    /// Timestamps have second resolution; a grant is expired at its
    /// deadline second, so a zero TTL never authorizes anything.
    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }
}

/// Learned success statistics for one (app, strategy) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStat {
    pub success_count: u64,
    pub attempt_count: u64,
    /// EWMA success rate, always within [0, 1].
    pub rolling_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- StrategyKind ----

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::Accessibility.to_string(), "accessibility");
        assert_eq!(StrategyKind::Vision.to_string(), "vision");
        assert_eq!(StrategyKind::CoordReplay.to_string(), "coord_replay");
        assert_eq!(StrategyKind::Process.to_string(), "process");
    }

    #[test]
    fn test_strategy_kind_from_str_round_trip() {
        for kind in StrategyKind::ALL {
            let parsed: StrategyKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
        assert!("clicker".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_kind_serde_round_trip() {
        for kind in StrategyKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            let rt: StrategyKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, rt);
        }
    }

    #[test]
    fn test_default_order_covers_all_kinds() {
        for kind in StrategyKind::ALL {
            assert!(DEFAULT_STRATEGY_ORDER.contains(&kind));
        }
        assert_eq!(DEFAULT_STRATEGY_ORDER.len(), StrategyKind::ALL.len());
    }

    #[test]
    fn test_coord_replay_is_last_by_default() {
        assert_eq!(
            DEFAULT_STRATEGY_ORDER.last(),
            Some(&StrategyKind::CoordReplay)
        );
    }

    // ---- FailureClass ----

    #[test]
    fn test_failure_class_recoverability() {
        assert!(FailureClass::BlockingDialog.is_recoverable());
        assert!(FailureClass::FocusStolen.is_recoverable());
        assert!(FailureClass::TargetNotFound.is_recoverable());
        assert!(!FailureClass::EnvironmentLocked.is_recoverable());
        assert!(!FailureClass::Unknown.is_recoverable());
    }

    #[test]
    fn test_failure_class_serde_format() {
        assert_eq!(
            serde_json::to_string(&FailureClass::EnvironmentLocked).unwrap(),
            "\"environment_locked\""
        );
        assert_eq!(
            serde_json::to_string(&FailureClass::BlockingDialog).unwrap(),
            "\"blocking_dialog\""
        );
    }

    // ---- Step ----

    #[test]
    fn test_step_builder_and_args() {
        let step = Step::new("click", "Click the save button")
            .with_arg("target", serde_json::json!("Save"))
            .with_arg("count", serde_json::json!(2));
        assert_eq!(step.arg_str("target"), Some("Save"));
        assert_eq!(step.arg_i64("count"), Some(2));
        assert_eq!(step.arg_str("missing"), None);
        assert!(step.critical);
        assert!(!step.unverifiable);
    }

    #[test]
    fn test_step_deserialize_minimal() {
        // The planner only has to send tool + args; everything else defaults.
        let step: Step = serde_json::from_str(
            r#"{"tool": "open_app", "args": {"app_name": "notepad"}}"#,
        )
        .unwrap();
        assert_eq!(step.tool, "open_app");
        assert_eq!(step.arg_str("app_name"), Some("notepad"));
        assert_eq!(step.timeout_secs, 30);
        assert_eq!(step.max_attempts, 2);
        assert_eq!(step.risk, RiskLevel::Low);
        assert!(step.critical);
        assert!(step.verify.is_none());
    }

    #[test]
    fn test_step_serde_round_trip() {
        let step = Step::new("type", "Type greeting")
            .with_arg("text", serde_json::json!("hello"))
            .with_verify(VerifySpec {
                kind: VerifyKind::TextVisible,
                value: "hello".to_string(),
                timeout_secs: 3,
                negate: false,
            });
        let json = serde_json::to_string(&step).unwrap();
        let rt: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.id, step.id);
        assert_eq!(rt.tool, "type");
        assert_eq!(rt.verify.as_ref().unwrap().value, "hello");
    }

    // ---- Plan / Verdict ----

    #[test]
    fn test_plan_admission_flag() {
        let mut plan = Plan::new("open notepad", vec![Step::new("open_app", "")]);
        assert!(!plan.is_admitted());

        plan.verdict = Some(Verdict::rejected(vec!["too many steps".into()]));
        assert!(!plan.is_admitted());

        plan.verdict = Some(Verdict::admitted());
        assert!(plan.is_admitted());
    }

    #[test]
    fn test_verdict_constructors() {
        let ok = Verdict::admitted();
        assert!(ok.admitted);
        assert!(ok.violations.is_empty());

        let bad = Verdict::rejected(vec!["a".into(), "b".into()]);
        assert!(!bad.admitted);
        assert_eq!(bad.violations.len(), 2);
    }

    #[test]
    fn test_plan_serde_round_trip() {
        let plan = Plan::new(
            "write a note",
            vec![
                Step::new("open_app", "Open editor"),
                Step::new("type", "Type the note"),
            ],
        );
        let json = serde_json::to_string(&plan).unwrap();
        let rt: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.id, plan.id);
        assert_eq!(rt.steps.len(), 2);
        assert!(rt.verdict.is_none());
    }

    // ---- SessionGrant ----

    #[test]
    fn test_session_grant_expiry() {
        let now = Timestamp::now();
        let live = SessionGrant {
            session_id: SessionId::new(),
            granted_at: now,
            expires_at: Timestamp(now.0 + 600),
            allowed_apps: HashSet::new(),
            allowed_folders: vec![],
            network_allowed: false,
        };
        assert!(!live.is_expired());

        let stale = SessionGrant {
            expires_at: Timestamp(now.0 - 1),
            ..live.clone()
        };
        assert!(stale.is_expired());
    }

    // ---- Timestamp ----

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp(100);
        let b = Timestamp(200);
        assert!(a < b);
        assert_eq!(a, Timestamp(100));
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let ts = Timestamp(1700000000);
        assert_eq!(ts.to_datetime().timestamp(), 1700000000);
    }

    // ---- StepResult / ExecutionReport ----

    #[test]
    fn test_step_result_serde_round_trip() {
        let result = StepResult {
            step_id: StepId::new(),
            success: true,
            strategy_used: Some(StrategyKind::Vision),
            attempts: 2,
            error: None,
            duration_ms: 120,
            verification: Some(VerificationResult {
                success: true,
                expected: "Notepad".to_string(),
                observed: Some("Untitled - Notepad".to_string()),
                duration_ms: 40,
                error: None,
            }),
        };
        let json = serde_json::to_string(&result).unwrap();
        let rt: StepResult = serde_json::from_str(&json).unwrap();
        assert!(rt.success);
        assert_eq!(rt.strategy_used, Some(StrategyKind::Vision));
        assert_eq!(rt.attempts, 2);
    }

    #[test]
    fn test_plan_outcome_display() {
        assert_eq!(PlanOutcome::Success.to_string(), "success");
        assert_eq!(PlanOutcome::Exhausted.to_string(), "exhausted");
    }

    // ---- StrategyStat ----

    #[test]
    fn test_strategy_stat_default() {
        let stat = StrategyStat::default();
        assert_eq!(stat.success_count, 0);
        assert_eq!(stat.attempt_count, 0);
        assert_eq!(stat.rolling_rate, 0.0);
    }
}
