use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AutopilotError, Result};
use crate::types::{FrequencyPolicy, TimeWindow};

/// Top-level configuration for the Autopilot application.
///
/// Loaded from `~/.autopilot/config.toml` by default. Each section corresponds
/// to a component of the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutopilotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub safety_limits: SafetyLimitsConfig,
    /// Per-mode sections keyed by mode name.
    #[serde(default)]
    pub modes: BTreeMap<String, ModeConfig>,
}

impl AutopilotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AutopilotConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
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
            toml::to_string_pretty(self).map_err(|e| AutopilotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check every section once, before anything is constructed from it.
    ///
    /// References to unknown mode names only produce warnings, since modes
    /// may be registered after the config is loaded.
    pub fn validate(&self) -> Result<()> {
        self.automation.safety.delay_range.validate("automation.safety")?;
        self.automation.scheduler.time_windows()?;

        if self.automation.scheduler.poll_interval_secs == 0 {
            return Err(AutopilotError::Config(
                "automation.scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }

        for (name, mode) in &self.modes {
            mode.validate(name)?;
        }

        for name in &self.automation.active_modes {
            if !self.modes.contains_key(name) {
                warn!(mode = %name, "active_modes references a mode with no config section");
            }
        }

        let windows = &self.automation.scheduler.time_windows;
        for (mode, preferred) in &self.automation.scheduler.preferred_times {
            for window in preferred {
                if !windows.contains_key(window) {
                    warn!(mode = %mode, window = %window, "Preferred time window is not defined; treated as no restriction");
                }
            }
        }
        Ok(())
    }

    /// The config section for `name`, or defaults when the section is missing.
    pub fn mode(&self, name: &str) -> ModeConfig {
        self.modes.get(name).cloned().unwrap_or_default()
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// A `[min, max]` range of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl DelayRange {
    pub const fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.min_secs > self.max_secs {
            return Err(AutopilotError::Config(format!(
                "{}.delay_range min ({}) exceeds max ({})",
                section, self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::new(5, 30)
    }
}

impl From<[u64; 2]> for DelayRange {
    fn from([min_secs, max_secs]: [u64; 2]) -> Self {
        Self { min_secs, max_secs }
    }
}

impl From<DelayRange> for [u64; 2] {
    fn from(range: DelayRange) -> Self {
        [range.min_secs, range.max_secs]
    }
}

/// Manager-level automation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Run every enabled mode instead of only those in `active_modes`.
    pub full_automation: bool,
    /// Ordered list of mode names to run when `full_automation` is off.
    pub active_modes: Vec<String>,
    pub safety: ManagerSafetyConfig,
    pub scheduler: SchedulerConfig,
}

/// Manager-level safety settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSafetyConfig {
    /// The upper bound is used as the delay between modes in a full pass.
    pub delay_range: DelayRange,
}

/// Background scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the background loop triggers modes at all.
    pub enabled: bool,
    /// Seconds between eligibility ticks.
    pub poll_interval_secs: u64,
    /// Seconds between two triggers within one tick.
    pub trigger_spacing_secs: u64,
    /// Seconds to wait for the loop to exit before warning on stop.
    pub stop_timeout_secs: u64,
    /// Rotation strategy label, reported in stats.
    pub mode_rotation: String,
    /// Named `[start_hour, end_hour]` ranges.
    pub time_windows: BTreeMap<String, [u32; 2]>,
    /// Mode name to the window names it prefers.
    pub preferred_times: HashMap<String, Vec<String>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
            trigger_spacing_secs: 30,
            stop_timeout_secs: 5,
            mode_rotation: "balanced".to_string(),
            time_windows: BTreeMap::new(),
            preferred_times: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured windows, rejecting invalid hour ranges.
    pub fn time_windows(&self) -> Result<Vec<TimeWindow>> {
        self.time_windows
            .iter()
            .map(|(name, [start, end])| TimeWindow::new(name.clone(), *start, *end))
            .collect()
    }

    /// Window names `mode` prefers; empty means any time.
    pub fn preferred_windows_for(&self, mode: &str) -> Vec<String> {
        self.preferred_times.get(mode).cloned().unwrap_or_default()
    }
}

/// Limits enforced by the reference rate-limit monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimitsConfig {
    pub max_actions_per_hour: u32,
    pub max_actions_per_day: u32,
    /// Daily caps for individual action types.
    pub per_action_daily: HashMap<String, u32>,
}

impl Default for SafetyLimitsConfig {
    fn default() -> Self {
        let per_action_daily = [("post", 3), ("comment", 15), ("connection_request", 10)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            max_actions_per_hour: 10,
            max_actions_per_day: 50,
            per_action_daily,
        }
    }
}

/// Per-mode configuration section.
///
/// Keys not recognized here are kept in `settings` and decoded by the
/// concrete mode into its own typed settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub engagement_frequency: FrequencyPolicy,
    #[serde(default)]
    pub safety: ModeSafetyConfig,
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl ModeConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.safety.error_threshold == 0 {
            return Err(AutopilotError::Config(format!(
                "modes.{}.safety.error_threshold must be positive",
                name
            )));
        }
        self.safety
            .delay_range
            .validate(&format!("modes.{}.safety", name))
    }
}

/// Per-mode safety settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSafetyConfig {
    /// Consecutive failures after which the mode pauses itself.
    pub error_threshold: u32,
    pub pause_on_errors: bool,
    /// Range for human-like delays between actions.
    pub delay_range: DelayRange,
}

impl Default for ModeSafetyConfig {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            pause_on_errors: true,
            delay_range: DelayRange::default(),
        }
    }
}
