//! CLI argument definitions for the Maestro binary.
//!
//! Uses `clap` with derive macros. Priority resolution:
//! CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Maestro: policy-gated, verified desktop automation.
#[derive(Parser, Debug)]
#[command(name = "maestro", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a plan file against the admission policy.
    Validate {
        /// Plan JSON file.
        #[arg(long = "plan")]
        plan: PathBuf,
    },
    /// Grant a session, approve the plan, and execute it (dry-run driver).
    Run {
        /// Plan JSON file.
        #[arg(long = "plan")]
        plan: PathBuf,
        /// Session TTL in seconds.
        #[arg(long = "ttl", default_value_t = 300)]
        ttl: u64,
        /// Comma-separated apps to allow for the session.
        #[arg(long = "apps")]
        apps: Option<String>,
        /// Allow network actions for the session.
        #[arg(long = "network")]
        network: bool,
    },
    /// Show or revoke the persisted session grant.
    Session {
        /// Revoke the current grant instead of showing it.
        #[arg(long = "revoke")]
        revoke: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MAESTRO_CONFIG env var > ~/.maestro/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("MAESTRO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".maestro").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".maestro").join("config.toml");
    }
    PathBuf::from("config.toml")
}
