//! Pre-flight plan admission.
//!
//! PlanGuard runs once, before approval, against a static policy. Checks
//! are deliberately not short-circuited: the caller gets every violation at
//! once so they can fix policy instead of guessing. A rejected plan is
//! never retried automatically; it requires a policy change or a new plan.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::warn;

use maestro_core::config::GuardConfig;
use maestro_core::types::{Plan, RiskLevel, Step, Verdict};

use crate::audit::{AuditLog, AuditRecord};
use crate::paths;

/// Tools that open or focus an application.
const APP_TOOLS: [&str; 2] = ["open_app", "focus_app"];

/// Tools that reach the network.
const NETWORK_TOOLS: [&str; 1] = ["open_url"];

/// Tools that take a filesystem path parameter.
const FILE_TOOLS: [&str; 2] = ["save_file", "open_file"];

/// Key chords that are never allowed, whatever the policy says.
const DANGEROUS_CHORDS: [(&[&str], &str); 4] = [
    (&["ctrl", "alt", "delete"], "Ctrl+Alt+Delete"),
    (&["alt", "f4"], "Alt+F4"),
    (&["win", "l"], "Win+L"),
    (&["win", "r"], "Win+R"),
];

/// One-time static validator run before a plan may execute.
pub struct PlanGuard {
    config: GuardConfig,
    audit: Arc<AuditLog>,
}

impl PlanGuard {
    pub fn new(config: GuardConfig, audit: Arc<AuditLog>) -> Self {
        Self { config, audit }
    }

    /// Validate a plan against the policy.
    ///
    /// Writes an audit record for every rejection.
    pub fn validate(&self, plan: &Plan) -> Verdict {
        self.validate_with_approval(plan, false)
    }

    /// Validate with the high-risk cap lifted (explicit user approval).
    pub fn validate_with_approval(&self, plan: &Plan, allow_high_risk: bool) -> Verdict {
        let mut violations: Vec<String> = Vec::new();

        if plan.steps.len() > self.config.max_steps {
            violations.push(format!(
                "plan has {} steps, max allowed is {}",
                plan.steps.len(),
                self.config.max_steps
            ));
        }

        let mut high_risk_count = 0usize;
        let mut total_attempts = 0u32;

        for (i, step) in plan.steps.iter().enumerate() {
            let step_num = i + 1;
            self.check_step(step, step_num, &mut violations);

            if step.risk == RiskLevel::High {
                high_risk_count += 1;
            }
            total_attempts = total_attempts.saturating_add(step.max_attempts);
        }

        if !allow_high_risk && high_risk_count > self.config.max_high_risk_steps {
            violations.push(format!(
                "plan has {} high-risk steps, max allowed is {} (requires explicit approval)",
                high_risk_count, self.config.max_high_risk_steps
            ));
        }

        if total_attempts > self.config.max_total_attempts {
            violations.push(format!(
                "plan allows {} total attempts, max allowed is {}",
                total_attempts, self.config.max_total_attempts
            ));
        }

        if violations.is_empty() {
            return Verdict::admitted();
        }

        warn!(
            plan_id = %plan.id,
            count = violations.len(),
            "Plan rejected"
        );
        if let Err(e) = self.audit.record(&AuditRecord::PlanRejected {
            plan_id: plan.id,
            violations: violations.clone(),
        }) {
            warn!(error = %e, "Failed to audit plan rejection");
        }
        Verdict::rejected(violations)
    }

    fn check_step(&self, step: &Step, step_num: usize, violations: &mut Vec<String>) {
        // Default-deny: a tool missing from the allow-set never runs.
        if !self.config.allowed_tools.iter().any(|t| t == &step.tool) {
            violations.push(format!("step {}: unknown tool '{}'", step_num, step.tool));
        }

        if APP_TOOLS.contains(&step.tool.as_str()) {
            match step.arg_str("app_name") {
                Some(raw) => {
                    let app = self.normalize_app(raw);
                    if self.config.blocked_apps.iter().any(|b| b == &app) {
                        violations.push(format!("app blocked for safety: {}", app));
                    } else if !self.config.trusted_apps.iter().any(|t| t == &app) {
                        violations.push(format!("app not trusted: {}", app));
                    }
                }
                None => {
                    violations.push(format!("step {}: missing app_name argument", step_num));
                }
            }
        }

        if NETWORK_TOOLS.contains(&step.tool.as_str()) {
            match step.arg_str("url") {
                Some(url) => self.check_url(url, step_num, violations),
                None => violations.push(format!("step {}: missing url argument", step_num)),
            }
        }

        if FILE_TOOLS.contains(&step.tool.as_str()) {
            match step.arg_str("path") {
                Some(raw) => self.check_path(raw, step_num, violations),
                None => violations.push(format!("step {}: missing path argument", step_num)),
            }
        }

        if step.tool == "keypress" {
            self.check_chord(step, step_num, violations);
        }

        if self.config.require_verification && step.verify.is_none() && !step.unverifiable {
            violations.push(format!(
                "step {}: missing verification spec (add verify or mark as unverifiable)",
                step_num
            ));
        }
    }

    /// Lowercase, trim, strip a `.exe` suffix, then resolve aliases.
    fn normalize_app(&self, raw: &str) -> String {
        let mut name = raw.trim().to_lowercase();
        if let Some(stripped) = name.strip_suffix(".exe") {
            name = stripped.to_string();
        }
        match self.config.app_aliases.get(&name) {
            Some(canonical) => canonical.clone(),
            None => name,
        }
    }

    fn check_url(&self, url: &str, step_num: usize, violations: &mut Vec<String>) {
        let Some(host) = extract_host(url) else {
            violations.push(format!("step {}: unparseable url '{}'", step_num, url));
            return;
        };

        // Raw IP literals bypass domain trust and are always rejected.
        if is_ip_literal(&host) {
            violations.push(format!("step {}: raw IP address rejected: {}", step_num, host));
            return;
        }

        let host_lower = host.to_lowercase();
        let trusted = self.config.trusted_domains.iter().any(|domain| {
            let d = domain.to_lowercase();
            host_lower == d || host_lower.ends_with(&format!(".{}", d))
        });
        if !trusted {
            violations.push(format!("step {}: domain not trusted: {}", step_num, host_lower));
        }
    }

    fn check_path(&self, raw: &str, step_num: usize, violations: &mut Vec<String>) {
        let expanded = paths::expand_home(raw);
        let Some(normalized) = paths::normalize(&expanded) else {
            violations.push(format!("step {}: path traversal rejected: {}", step_num, raw));
            return;
        };

        let permitted = self.config.permitted_roots.iter().any(|root| {
            paths::normalize(&paths::expand_home(root))
                .map(|r| paths::is_within(&normalized, &r))
                .unwrap_or(false)
        });
        if !permitted {
            violations.push(format!(
                "step {}: path outside permitted roots: {}",
                step_num,
                normalized.display()
            ));
        }
    }

    fn check_chord(&self, step: &Step, step_num: usize, violations: &mut Vec<String>) {
        let keys: Vec<String> = step
            .args
            .get("keys")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|k| k.as_str())
                    .map(|k| k.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        for (chord, name) in DANGEROUS_CHORDS {
            if chord.iter().all(|k| keys.iter().any(|have| have == k)) {
                violations.push(format!(
                    "step {}: blocked dangerous keypress {}",
                    step_num, name
                ));
            }
        }
    }
}

/// Pull the host out of a URL without a full parser.
///
/// Handles `scheme://user@host:port/path` shapes and bracketed IPv6 hosts.
fn extract_host(url: &str) -> Option<String> {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .filter(|a| !a.is_empty())?;
    // Drop userinfo.
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };
    if host_port.is_empty() {
        return None;
    }
    // Bracketed IPv6 keeps its colons.
    if let Some(stripped) = host_port.strip_prefix('[') {
        let end = stripped.find(']')?;
        return Some(stripped[..end].to_string());
    }
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn is_ip_literal(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}
