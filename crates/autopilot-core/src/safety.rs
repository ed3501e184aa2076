//! Safety monitor capability and a reference rate-limit policy.
//!
//! Modes and the scheduler only ever talk to the monitor through the two
//! calls on [`SafetyMonitor`]. An absent monitor is treated as "always allow"
//! by callers.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::config::SafetyLimitsConfig;
use crate::error::{AutopilotError, Result};

/// Suffix of the action class a mode reports for a whole run.
pub const RUN_ACTION_SUFFIX: &str = "_run";

/// Build the action class a mode run is checked and recorded under.
pub fn run_action(mode_name: &str) -> String {
    format!("{}{}", mode_name, RUN_ACTION_SUFFIX)
}

/// Rate/quota policy shared by every mode.
///
/// Both calls may be made concurrently from several modes.
pub trait SafetyMonitor: Send + Sync {
    /// Whether an action of this class may be performed now.
    fn can_perform_action(&self, action_type: &str) -> bool;

    /// Record that an action of this class was performed.
    fn record_action(&self, action_type: &str) -> Result<()>;

    /// Whether a run of the named mode may start now.
    fn can_start_run(&self, mode_name: &str) -> bool {
        self.can_perform_action(&run_action(mode_name))
    }

    /// Record a completed run of the named mode.
    fn record_run(&self, mode_name: &str) -> Result<()> {
        self.record_action(&run_action(mode_name))
    }
}

/// In-memory sliding-window rate limiter.
///
/// Discrete actions count toward the hourly and daily budgets. Completed
/// runs are kept in a separate history and never consume budget; a run is
/// allowed while the global budgets have room.
pub struct RateLimitMonitor {
    limits: SafetyLimitsConfig,
    history: Mutex<History>,
    runs: Mutex<History>,
}

type History = VecDeque<(DateTime<Utc>, String)>;

fn push_pruned(history: &mut History, action_type: &str, at: DateTime<Utc>) {
    let cutoff = at - Duration::days(1);
    while history.front().is_some_and(|(t, _)| *t <= cutoff) {
        history.pop_front();
    }
    history.push_back((at, action_type.to_string()));
}

impl RateLimitMonitor {
    /// Create a monitor enforcing the given limits.
    pub fn new(limits: SafetyLimitsConfig) -> Self {
        Self {
            limits,
            history: Mutex::new(VecDeque::new()),
            runs: Mutex::new(VecDeque::new()),
        }
    }

    /// Check an action against the limits as of `now`.
    pub fn can_perform_action_at(&self, action_type: &str, now: DateTime<Utc>) -> bool {
        let history = match self.history.lock() {
            Ok(h) => h,
            Err(_) => return false,
        };

        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::days(1);

        let mut hourly = 0u32;
        let mut daily = 0u32;
        let mut same_type_daily = 0u32;
        for (at, action) in history.iter() {
            if *at > day_ago {
                daily += 1;
                if action == action_type {
                    same_type_daily += 1;
                }
                if *at > hour_ago {
                    hourly += 1;
                }
            }
        }

        if hourly >= self.limits.max_actions_per_hour {
            tracing::warn!(
                action = %action_type,
                hourly,
                limit = self.limits.max_actions_per_hour,
                "Hourly action limit reached"
            );
            return false;
        }
        if daily >= self.limits.max_actions_per_day {
            tracing::warn!(
                action = %action_type,
                daily,
                limit = self.limits.max_actions_per_day,
                "Daily action limit reached"
            );
            return false;
        }
        if let Some(cap) = self.limits.per_action_daily.get(action_type) {
            if same_type_daily >= *cap {
                tracing::warn!(action = %action_type, count = same_type_daily, cap, "Per-action daily cap reached");
                return false;
            }
        }
        true
    }

    /// Record an action as having happened at `at`.
    pub fn record_action_at(&self, action_type: &str, at: DateTime<Utc>) -> Result<()> {
        let mut history = self
            .history
            .lock()
            .map_err(|e| AutopilotError::Safety(format!("Lock poisoned: {}", e)))?;
        push_pruned(&mut history, action_type, at);
        Ok(())
    }

    /// Record a completed mode run as having happened at `at`.
    pub fn record_run_at(&self, mode_name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|e| AutopilotError::Safety(format!("Lock poisoned: {}", e)))?;
        push_pruned(&mut runs, &run_action(mode_name), at);
        Ok(())
    }

    /// Number of actions and runs currently retained in the window.
    pub fn recorded_count(&self) -> usize {
        let actions = self.history.lock().map(|h| h.len()).unwrap_or(0);
        let runs = self.runs.lock().map(|r| r.len()).unwrap_or(0);
        actions + runs
    }
}

impl SafetyMonitor for RateLimitMonitor {
    fn can_perform_action(&self, action_type: &str) -> bool {
        self.can_perform_action_at(action_type, Utc::now())
    }

    fn record_action(&self, action_type: &str) -> Result<()> {
        self.record_action_at(action_type, Utc::now())
    }

    fn record_run(&self, mode_name: &str) -> Result<()> {
        self.record_run_at(mode_name, Utc::now())
    }
}
