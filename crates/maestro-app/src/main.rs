//! Maestro application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the safety layer (audit log, session store, PlanGuard)
//! 3. Build the execution engine over a desktop driver
//! 4. Dispatch the CLI command (validate / run / session)
//!
//! The bundled driver is the dry-run one: actions are staged and logged,
//! never performed. Real drivers are platform integrations injected here
//! at composition time.

mod cli;
mod service;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use maestro_core::config::MaestroConfig;
use maestro_core::types::Plan;
use maestro_executor::{
    Desktop, DryRunDesktop, EventBroadcaster, RecoveryManager, RecoveryPolicy,
    ReliableExecutor, StrategyRanker, StrategyRegistry, Verifier,
};
use maestro_safety::paths::expand_home;
use maestro_safety::{AuditLog, PlanGuard, SessionAuthority, SessionStore};
use service::{Approval, AutomationService, StaticPlanner};

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let default_level = args.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!("Starting Maestro v{}", env!("CARGO_PKG_VERSION"));

    let config_file = args.resolve_config_path();
    let config = MaestroConfig::load_or_default(&config_file);
    config.validate()?;

    let data_dir = expand_home(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let audit = Arc::new(AuditLog::new(
        data_dir.join("audit.jsonl"),
        config.audit.clone(),
    )?);
    let session = Arc::new(SessionAuthority::new(
        config.session.clone(),
        SessionStore::new(data_dir.join("session.json")),
        Arc::clone(&audit),
    ));

    match args.command {
        Command::Validate { plan } => {
            let plan = load_plan(&plan)?;
            let guard = PlanGuard::new(config.guard.clone(), Arc::clone(&audit));
            let verdict = guard.validate(&plan);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.admitted {
                std::process::exit(1);
            }
        }
        Command::Run {
            plan,
            ttl,
            apps,
            network,
        } => {
            let plan = load_plan(&plan)?;
            let task = plan.task.clone();
            let service = build_service(&config, plan, Arc::clone(&session), audit);

            let apps: Vec<String> = apps
                .map(|raw| raw.split(',').map(|a| a.trim().to_string()).collect())
                .unwrap_or_default();
            service.grant_session(
                Some(Duration::from_secs(ttl)),
                apps,
                Vec::new(),
                network,
            )?;

            let (plan, verdict) = service.preview_plan(&task).await?;
            if !verdict.admitted {
                eprintln!("plan rejected:");
                for violation in &verdict.violations {
                    eprintln!("  - {}", violation);
                }
                std::process::exit(1);
            }
            match service.approve_plan(plan.id) {
                Approval::Accepted => {}
                Approval::Rejected { reason } => {
                    eprintln!("approval rejected: {}", reason);
                    std::process::exit(1);
                }
            }

            // Print progress events while the plan runs.
            let mut events = service.subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    eprintln!("[{}] {}", event.timestamp().0, event.event_name());
                }
            });

            let report = service.execute_plan(plan.id).await?;
            printer.abort();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Session { revoke } => {
            if revoke {
                session.revoke()?;
                println!("session revoked");
            } else if session.check() {
                let grant = session.current();
                println!("{}", serde_json::to_string_pretty(&grant)?);
            } else {
                println!("no active session");
            }
        }
    }

    Ok(())
}

fn load_plan(path: &Path) -> Result<Plan, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn build_service(
    config: &MaestroConfig,
    plan: Plan,
    session: Arc<SessionAuthority>,
    audit: Arc<AuditLog>,
) -> AutomationService {
    let desktop: Arc<dyn Desktop> = Arc::new(DryRunDesktop);
    let executor = ReliableExecutor::new(
        StrategyRegistry::standard(Arc::clone(&desktop)),
        Verifier::new(
            Arc::clone(&desktop),
            Duration::from_millis(config.executor.verify_poll_ms),
        ),
        StrategyRanker::new(config.ranker.clone()),
        RecoveryManager::new(Arc::clone(&desktop), RecoveryPolicy::default()),
        Arc::clone(&session),
        Arc::clone(&audit),
        EventBroadcaster::default(),
        desktop,
        config.executor.clone(),
        config.budget.clone(),
    );
    let guard = PlanGuard::new(config.guard.clone(), audit);
    AutomationService::new(
        guard,
        session,
        executor,
        Arc::new(StaticPlanner::new(plan)),
        Duration::from_secs(config.guard.pending_plan_ttl_secs),
    )
}
