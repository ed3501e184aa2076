//! Autopilot application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Build the shared safety monitor and the simulated collaborators
//! 3. Register the built-in modes and build the scheduler
//! 4. Run the requested command

mod cli;

use std::sync::Arc;

use clap::Parser;

use autopilot_core::config::AutopilotConfig;
use autopilot_core::safety::SafetyMonitor;
use autopilot_core::RateLimitMonitor;
use autopilot_modes::{register_builtin_modes, Collaborators, Registry, Scheduler, SchedulerSettings};

use cli::{CliArgs, Command};

fn init_tracing(args: &CliArgs, config_level: &str) {
    let filter = match &args.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_scheduler(config: &AutopilotConfig) -> Result<Arc<Scheduler>, Box<dyn std::error::Error>> {
    let safety: Arc<dyn SafetyMonitor> =
        Arc::new(RateLimitMonitor::new(config.safety_limits.clone()));
    let collaborators = Collaborators::simulated();
    tracing::info!("Using simulated collaborators");

    let registry = Arc::new(Registry::from_config(&config.automation));
    let registered = register_builtin_modes(&registry, config, &collaborators, Some(safety))?;
    tracing::info!(
        registered,
        active = registry.active_modes().len(),
        full_automation = registry.full_automation(),
        "Modes registered"
    );
    if registry.active_modes().is_empty() {
        tracing::warn!("No active modes; enable a mode and list it in automation.active_modes");
    }

    let settings = SchedulerSettings::from_config(&config.automation)?;
    Ok(Arc::new(Scheduler::new(registry, settings)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first, so its log level can seed the subscriber.
    let config_file = args.resolve_config_path();
    let loaded = AutopilotConfig::load(&config_file);
    let config_level = match &loaded {
        Ok(config) => config.general.log_level.clone(),
        Err(_) => "info".to_string(),
    };
    init_tracing(&args, &args.resolve_log_level(&config_level));

    tracing::info!("Starting Autopilot v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults");
            AutopilotConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let scheduler = build_scheduler(&config)?;

    match args.command {
        Command::Run => {
            let results = scheduler.run_all_active().await;
            let failed = results.iter().filter(|r| !r.success).count();
            tracing::info!(modes = results.len(), failed, "Run finished");
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::RunMode { name } => {
            let result = scheduler.run_mode(&name).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
        }
        Command::Daemon => {
            if !config.automation.scheduler.enabled {
                tracing::warn!("Scheduler disabled in config; the loop will idle until stopped");
            }
            scheduler.start_background_loop();
            tracing::info!("Press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown requested");
            scheduler.stop_background_loop().await?;
            println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
        }
    }

    Ok(())
}
