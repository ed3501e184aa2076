//! CLI argument definitions for the Autopilot application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autopilot: runs automation modes under shared safety limits.
#[derive(Parser, Debug)]
#[command(name = "autopilot", version, about)]
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

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run every active mode once and print the results as JSON.
    Run,
    /// Run a single mode by name, regardless of its schedule.
    RunMode {
        /// Registered mode name, e.g. `feed_engagement`.
        name: String,
    },
    /// Print manager and per-mode statistics as JSON.
    Stats,
    /// Start the background scheduler and run until Ctrl-C.
    Daemon,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > AUTOPILOT_CONFIG env var > ~/.autopilot/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AUTOPILOT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the default log filter directive.
    ///
    /// Priority: --log-level flag > config file value. `RUST_LOG`, when set,
    /// is applied by the subscriber before either.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".autopilot").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".autopilot").join("config.toml");
    }
    PathBuf::from("config.toml")
}
