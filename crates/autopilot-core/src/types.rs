use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AutopilotError, Result};

/// Opaque mode-specific key/value payload attached to an [`ExecutionResult`].
pub type Metrics = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Enums
// =============================================================================

/// Minimum spacing between automatic triggers of a mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPolicy {
    /// At most once per hour.
    Hourly,
    /// At most once every 12 hours.
    TwiceDaily,
    /// At most once every 24 hours.
    #[default]
    Daily,
    /// Never triggered by the background loop; on-demand runs only.
    Manual,
}

impl FrequencyPolicy {
    /// Minimum elapsed time since the last run, or `None` for [`FrequencyPolicy::Manual`].
    pub fn min_interval(&self) -> Option<Duration> {
        match self {
            FrequencyPolicy::Hourly => Some(Duration::hours(1)),
            FrequencyPolicy::TwiceDaily => Some(Duration::hours(12)),
            FrequencyPolicy::Daily => Some(Duration::hours(24)),
            FrequencyPolicy::Manual => None,
        }
    }

    /// Whether a mode last run at `last_run_at` is due for an automatic trigger at `now`.
    ///
    /// A mode that has never run is always due, unless it is manual.
    pub fn is_due(&self, last_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(min_interval) = self.min_interval() else {
            return false;
        };
        match last_run_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= min_interval,
        }
    }
}

impl fmt::Display for FrequencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyPolicy::Hourly => write!(f, "hourly"),
            FrequencyPolicy::TwiceDaily => write!(f, "twice_daily"),
            FrequencyPolicy::Daily => write!(f, "daily"),
            FrequencyPolicy::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for FrequencyPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(FrequencyPolicy::Hourly),
            "twice_daily" => Ok(FrequencyPolicy::TwiceDaily),
            "daily" => Ok(FrequencyPolicy::Daily),
            "manual" => Ok(FrequencyPolicy::Manual),
            _ => Err(format!("Unknown engagement frequency: {}", s)),
        }
    }
}

/// Why a mode run was refused before any work started.
///
/// A rejection is an expected outcome, not an error; it never touches the
/// mode's error count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The mode is disabled.
    Disabled,
    /// Another execution of the same mode is in flight.
    AlreadyRunning,
    /// The mode paused itself after too many consecutive failures.
    ErrorThresholdReached { error_count: u32, threshold: u32 },
    /// The safety monitor denied the run.
    SafetyLimit { action_type: String },
    /// The mode's own configuration check failed.
    InvalidConfig { message: String },
    /// No mode is registered under the requested name.
    NotFound,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Disabled => write!(f, "mode is disabled"),
            RejectReason::AlreadyRunning => write!(f, "mode is already running"),
            RejectReason::ErrorThresholdReached {
                error_count,
                threshold,
            } => write!(
                f,
                "mode paused after {} errors (threshold: {})",
                error_count, threshold
            ),
            RejectReason::SafetyLimit { action_type } => {
                write!(f, "safety monitor denied {}", action_type)
            }
            RejectReason::InvalidConfig { message } => {
                write!(f, "invalid configuration: {}", message)
            }
            RejectReason::NotFound => write!(f, "mode not found"),
        }
    }
}

// =============================================================================
// Time windows
// =============================================================================

/// A named hour range `[start_hour, end_hour)` in local time.
///
/// A window whose start is after its end wraps past midnight, so `[22, 2)`
/// covers 22:00 through 01:59.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeWindow {
    /// Build a window, rejecting hours outside `0..=23` and empty ranges.
    pub fn new(name: impl Into<String>, start_hour: u32, end_hour: u32) -> Result<Self> {
        let name = name.into();
        if start_hour > 23 || end_hour > 23 {
            return Err(AutopilotError::Config(format!(
                "time window '{}' has hour outside 0..=23: [{}, {}]",
                name, start_hour, end_hour
            )));
        }
        if start_hour == end_hour {
            return Err(AutopilotError::Config(format!(
                "time window '{}' is empty: [{}, {}]",
                name, start_hour, end_hour
            )));
        }
        Ok(Self {
            name,
            start_hour,
            end_hour,
        })
    }

    /// Whether `hour` falls inside this window.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

// =============================================================================
// Execution results
// =============================================================================

/// Uniform result envelope produced once per mode run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub mode_name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub actions_performed: u32,
    pub error_message: Option<String>,
    /// Set when the run was refused before execution began.
    pub rejection: Option<RejectReason>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl ExecutionResult {
    /// A run that never started.
    pub fn rejected(mode_name: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode_name: mode_name.into(),
            success: false,
            started_at: Utc::now(),
            duration_seconds: 0.0,
            actions_performed: 0,
            error_message: Some(reason.to_string()),
            rejection: Some(reason),
            metrics: Metrics::new(),
        }
    }

    /// A run whose execution returned normally.
    pub fn completed(
        mode_name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        actions_performed: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode_name: mode_name.into(),
            success: true,
            started_at,
            duration_seconds,
            actions_performed,
            error_message: None,
            rejection: None,
            metrics,
        }
    }

    /// A run whose execution failed after `actions_performed` actions.
    pub fn failed(
        mode_name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        actions_performed: u32,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode_name: mode_name.into(),
            success: false,
            started_at,
            duration_seconds,
            actions_performed,
            error_message: Some(error_message.into()),
            rejection: None,
            metrics: Metrics::new(),
        }
    }

    /// True when the run was refused by the run guard.
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

// =============================================================================
// Stats snapshots
// =============================================================================

/// Read-only snapshot of one mode's lifecycle state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeStats {
    pub name: String,
    pub enabled: bool,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub actions_this_run: u32,
    pub frequency: FrequencyPolicy,
}

/// Manager-level counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub running: bool,
    pub full_automation: bool,
    pub scheduler_enabled: bool,
    pub mode_rotation: String,
    pub total_modes: usize,
    pub active_modes: usize,
}

/// Full stats report: manager counters plus every registered mode in registry order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationStats {
    pub manager: ManagerStats,
    pub modes: Vec<ModeStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // FrequencyPolicy
    // =========================================================================

    #[test]
    fn test_frequency_never_run_is_due() {
        let now = Utc::now();
        assert!(FrequencyPolicy::Hourly.is_due(None, now));
        assert!(FrequencyPolicy::TwiceDaily.is_due(None, now));
        assert!(FrequencyPolicy::Daily.is_due(None, now));
    }

    #[test]
    fn test_frequency_manual_never_due() {
        let now = Utc::now();
        assert!(!FrequencyPolicy::Manual.is_due(None, now));
        assert!(!FrequencyPolicy::Manual.is_due(Some(now - Duration::days(30)), now));
    }

    #[test]
    fn test_frequency_daily_boundaries() {
        let now = Utc::now();
        assert!(!FrequencyPolicy::Daily.is_due(Some(now - Duration::hours(23)), now));
        assert!(FrequencyPolicy::Daily.is_due(Some(now - Duration::hours(24)), now));
        assert!(FrequencyPolicy::Daily.is_due(Some(now - Duration::hours(25)), now));
    }

    #[test]
    fn test_frequency_hourly_and_twice_daily() {
        let now = Utc::now();
        assert!(!FrequencyPolicy::Hourly.is_due(Some(now - Duration::minutes(59)), now));
        assert!(FrequencyPolicy::Hourly.is_due(Some(now - Duration::minutes(61)), now));
        assert!(!FrequencyPolicy::TwiceDaily.is_due(Some(now - Duration::hours(11)), now));
        assert!(FrequencyPolicy::TwiceDaily.is_due(Some(now - Duration::hours(13)), now));
    }

    #[test]
    fn test_frequency_display_and_parse() {
        for policy in [
            FrequencyPolicy::Hourly,
            FrequencyPolicy::TwiceDaily,
            FrequencyPolicy::Daily,
            FrequencyPolicy::Manual,
        ] {
            let parsed: FrequencyPolicy = policy.to_string().parse().unwrap();
            assert_eq!(parsed, policy);
        }
        assert!("weekly".parse::<FrequencyPolicy>().is_err());
    }

    #[test]
    fn test_frequency_default_is_daily() {
        assert_eq!(FrequencyPolicy::default(), FrequencyPolicy::Daily);
    }

    // =========================================================================
    // TimeWindow
    // =========================================================================

    #[test]
    fn test_window_contains_hour() {
        let morning = TimeWindow::new("morning", 6, 12).unwrap();
        assert!(morning.contains_hour(6));
        assert!(morning.contains_hour(9));
        assert!(!morning.contains_hour(12));
        assert!(!morning.contains_hour(13));
        assert!(!morning.contains_hour(5));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let night = TimeWindow::new("night", 22, 2).unwrap();
        assert!(night.contains_hour(22));
        assert!(night.contains_hour(23));
        assert!(night.contains_hour(0));
        assert!(night.contains_hour(1));
        assert!(!night.contains_hour(2));
        assert!(!night.contains_hour(12));
    }

    #[test]
    fn test_window_rejects_bad_hours() {
        assert!(TimeWindow::new("bad", 6, 24).is_err());
        assert!(TimeWindow::new("bad", 30, 2).is_err());
        assert!(TimeWindow::new("empty", 8, 8).is_err());
    }

    // =========================================================================
    // ExecutionResult
    // =========================================================================

    #[test]
    fn test_rejected_result_carries_reason() {
        let result = ExecutionResult::rejected("feed_engagement", RejectReason::AlreadyRunning);
        assert!(!result.success);
        assert!(result.is_rejected());
        assert_eq!(result.actions_performed, 0);
        assert_eq!(result.error_message.as_deref(), Some("mode is already running"));
    }

    #[test]
    fn test_failed_result_keeps_partial_actions() {
        let result = ExecutionResult::failed("post_response", Utc::now(), 1.5, 2, "boom");
        assert!(!result.success);
        assert!(!result.is_rejected());
        assert_eq!(result.actions_performed, 2);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_reject_reason_display() {
        let reason = RejectReason::ErrorThresholdReached {
            error_count: 3,
            threshold: 3,
        };
        assert_eq!(reason.to_string(), "mode paused after 3 errors (threshold: 3)");

        let reason = RejectReason::SafetyLimit {
            action_type: "feed_engagement_run".to_string(),
        };
        assert_eq!(reason.to_string(), "safety monitor denied feed_engagement_run");
    }

    #[test]
    fn test_result_serializes_with_tagged_rejection() {
        let result = ExecutionResult::rejected("x", RejectReason::Disabled);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rejection"]["kind"], "disabled");
        assert_eq!(json["mode_name"], "x");
    }
}
