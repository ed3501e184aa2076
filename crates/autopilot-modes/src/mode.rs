//! Mode lifecycle and safety state machine.
//!
//! A [`Mode`] wraps one piece of [`ModeLogic`] and owns the run guard, the
//! error budget, and the running flag. Concrete modes only supply
//! `execute`; they cannot leave the wrapper stuck in the running state.
//!
//! States: `Disabled`, `Idle`, `Running`. A run moves `Idle -> Running ->
//! Idle` whether it succeeds or fails; disabling is allowed at any time and
//! does not interrupt a run in flight.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use autopilot_core::config::{DelayRange, ModeConfig};
use autopilot_core::safety::{run_action, SafetyMonitor};
use autopilot_core::types::{
    ExecutionResult, FrequencyPolicy, Metrics, ModeStats, RejectReason,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModeError;

/// Mode-specific execution logic.
#[async_trait]
pub trait ModeLogic: Send + Sync {
    /// Check mode-specific settings. Called before every run; a failure
    /// rejects the run without counting as an error.
    fn validate_config(&self) -> Result<(), ModeError> {
        Ok(())
    }

    /// Perform the mode's work, reporting each discrete action through
    /// [`ModeContext::record_action`]. Returns mode-specific metrics.
    async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError>;
}

/// Observable lifecycle state of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeStatus {
    Disabled,
    Idle,
    Running,
}

impl fmt::Display for ModeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeStatus::Disabled => write!(f, "disabled"),
            ModeStatus::Idle => write!(f, "idle"),
            ModeStatus::Running => write!(f, "running"),
        }
    }
}

/// Static settings of a mode, fixed at construction.
#[derive(Debug, Clone)]
pub struct ModeSpec {
    pub name: String,
    pub enabled: bool,
    pub frequency: FrequencyPolicy,
    pub error_threshold: u32,
    pub pause_on_errors: bool,
    pub delay_range: DelayRange,
    /// Preferred time window names; empty means any time.
    pub preferred_windows: Vec<String>,
}

impl ModeSpec {
    /// A spec with default safety settings, enabled.
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = ModeConfig::default();
        Self {
            name: name.into(),
            enabled: true,
            frequency: defaults.engagement_frequency,
            error_threshold: defaults.safety.error_threshold,
            pause_on_errors: defaults.safety.pause_on_errors,
            delay_range: defaults.safety.delay_range,
            preferred_windows: Vec::new(),
        }
    }

    /// Build a spec from a mode's config section.
    pub fn from_config(
        name: impl Into<String>,
        config: &ModeConfig,
        preferred_windows: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: config.enabled,
            frequency: config.engagement_frequency,
            error_threshold: config.safety.error_threshold.max(1),
            pause_on_errors: config.safety.pause_on_errors,
            delay_range: config.safety.delay_range,
            preferred_windows,
        }
    }

    pub fn with_frequency(mut self, frequency: FrequencyPolicy) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32, pause_on_errors: bool) -> Self {
        self.error_threshold = threshold.max(1);
        self.pause_on_errors = pause_on_errors;
        self
    }

    pub fn with_preferred_windows(mut self, windows: Vec<String>) -> Self {
        self.preferred_windows = windows;
        self
    }

    pub fn with_delay_range(mut self, delay_range: DelayRange) -> Self {
        self.delay_range = delay_range;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Default)]
struct ModeState {
    enabled: bool,
    running: bool,
    error_count: u32,
    last_run_at: Option<DateTime<Utc>>,
    actions_this_run: u32,
}

/// A registered unit of automated work with its lifecycle state.
pub struct Mode {
    spec: ModeSpec,
    logic: Box<dyn ModeLogic>,
    safety: Option<Arc<dyn SafetyMonitor>>,
    state: Mutex<ModeState>,
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("spec", &self.spec)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

impl Mode {
    /// Wrap `logic` with the lifecycle described by `spec`.
    ///
    /// Without a safety monitor every action is allowed.
    pub fn new(
        spec: ModeSpec,
        logic: impl ModeLogic + 'static,
        safety: Option<Arc<dyn SafetyMonitor>>,
    ) -> Self {
        let state = ModeState {
            enabled: spec.enabled,
            ..ModeState::default()
        };
        Self {
            spec,
            logic: Box::new(logic),
            safety,
            state: Mutex::new(state),
        }
    }

    // The state is plain data updated in single statements, so a poisoned
    // lock still holds a consistent value.
    fn lock_state(&self) -> MutexGuard<'_, ModeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ModeSpec {
        &self.spec
    }

    pub fn frequency(&self) -> FrequencyPolicy {
        self.spec.frequency
    }

    pub fn preferred_windows(&self) -> &[String] {
        &self.spec.preferred_windows
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    pub fn error_count(&self) -> u32 {
        self.lock_state().error_count
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_run_at
    }

    pub fn actions_this_run(&self) -> u32 {
        self.lock_state().actions_this_run
    }

    pub fn status(&self) -> ModeStatus {
        let state = self.lock_state();
        if state.running {
            ModeStatus::Running
        } else if !state.enabled {
            ModeStatus::Disabled
        } else {
            ModeStatus::Idle
        }
    }

    fn reject_reason(&self, state: &ModeState) -> Option<RejectReason> {
        if !state.enabled {
            return Some(RejectReason::Disabled);
        }
        if state.running {
            return Some(RejectReason::AlreadyRunning);
        }
        if self.spec.pause_on_errors && state.error_count >= self.spec.error_threshold {
            return Some(RejectReason::ErrorThresholdReached {
                error_count: state.error_count,
                threshold: self.spec.error_threshold,
            });
        }
        if let Some(safety) = &self.safety {
            if !safety.can_start_run(&self.spec.name) {
                return Some(RejectReason::SafetyLimit {
                    action_type: run_action(&self.spec.name),
                });
            }
        }
        None
    }

    /// Whether a run would be allowed right now. Has no side effects.
    pub fn can_run(&self) -> bool {
        let state = self.lock_state();
        self.reject_reason(&state).is_none()
    }

    /// Run the mode once.
    ///
    /// The guard check and the transition to running happen under one lock,
    /// so of two concurrent callers exactly one executes and the other gets
    /// an immediate `AlreadyRunning` rejection. Failures inside `execute`,
    /// including panics, become a failed result and count against the error
    /// budget.
    pub async fn start(&self) -> ExecutionResult {
        let name = self.spec.name.as_str();
        {
            let mut state = self.lock_state();
            if let Some(reason) = self.reject_reason(&state) {
                match &reason {
                    RejectReason::ErrorThresholdReached { .. } | RejectReason::SafetyLimit { .. } => {
                        tracing::warn!(mode = %name, reason = %reason, "Mode cannot run");
                    }
                    _ => tracing::debug!(mode = %name, reason = %reason, "Mode cannot run"),
                }
                return ExecutionResult::rejected(name, reason);
            }
            if let Err(e) = self.logic.validate_config() {
                tracing::warn!(mode = %name, error = %e, "Mode configuration invalid");
                return ExecutionResult::rejected(
                    name,
                    RejectReason::InvalidConfig {
                        message: e.to_string(),
                    },
                );
            }
            state.running = true;
            state.actions_this_run = 0;
        }
        let running = RunningGuard { mode: self };

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(mode = %name, "Starting mode");

        let ctx = ModeContext { mode: self };
        let outcome = match AssertUnwindSafe(self.logic.execute(&ctx)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(ModeError::Panicked(panic_message(panic.as_ref()))),
        };
        let duration = clock.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(metrics) => {
                if let Some(safety) = &self.safety {
                    if let Err(e) = safety.record_run(name) {
                        tracing::warn!(mode = %name, error = %e, "Failed to record run with safety monitor");
                    }
                }
                let mut state = self.lock_state();
                state.last_run_at = Some(Utc::now());
                state.error_count = 0;
                let actions = state.actions_this_run;
                drop(state);
                tracing::info!(
                    mode = %name,
                    actions,
                    duration_secs = duration,
                    "Mode completed"
                );
                ExecutionResult::completed(name, started_at, duration, actions, metrics)
            }
            Err(e) => {
                let mut state = self.lock_state();
                state.error_count = state.error_count.saturating_add(1);
                let actions = state.actions_this_run;
                let error_count = state.error_count;
                drop(state);
                tracing::error!(
                    mode = %name,
                    error = %e,
                    actions,
                    error_count,
                    "Mode failed"
                );
                ExecutionResult::failed(name, started_at, duration, actions, e.to_string())
            }
        };

        drop(running);
        result
    }

    /// Count one discrete action and forward it to the safety monitor.
    ///
    /// The local count is kept even if the monitor fails to record it.
    pub fn record_action(&self, action_type: &str) {
        let total = {
            let mut state = self.lock_state();
            state.actions_this_run += 1;
            state.actions_this_run
        };
        if let Some(safety) = &self.safety {
            if let Err(e) = safety.record_action(action_type) {
                tracing::warn!(mode = %self.spec.name, action = %action_type, error = %e, "Safety monitor failed to record action");
            }
        }
        tracing::debug!(mode = %self.spec.name, action = %action_type, total, "Action recorded");
    }

    /// Whether the safety monitor allows an action of this class.
    pub fn check_safety_limits(&self, action_type: &str) -> bool {
        self.safety
            .as_ref()
            .map_or(true, |safety| safety.can_perform_action(action_type))
    }

    pub fn enable(&self) {
        self.lock_state().enabled = true;
        tracing::info!(mode = %self.spec.name, "Mode enabled");
    }

    /// Disable future runs. A run already in flight continues.
    pub fn disable(&self) {
        self.lock_state().enabled = false;
        tracing::info!(mode = %self.spec.name, "Mode disabled");
    }

    /// Clear the error count, resuming a mode paused by its error budget.
    pub fn reset_errors(&self) {
        self.lock_state().error_count = 0;
        tracing::info!(mode = %self.spec.name, "Mode error counter reset");
    }

    /// Seed the last-run time from externally persisted history.
    pub fn restore_last_run(&self, last_run_at: Option<DateTime<Utc>>) {
        self.lock_state().last_run_at = last_run_at;
    }

    /// Read-only snapshot of this mode's state.
    pub fn stats(&self) -> ModeStats {
        let state = self.lock_state();
        ModeStats {
            name: self.spec.name.clone(),
            enabled: state.enabled,
            running: state.running,
            last_run_at: state.last_run_at,
            error_count: state.error_count,
            actions_this_run: state.actions_this_run,
            frequency: self.spec.frequency,
        }
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a> {
    mode: &'a Mode,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.mode.lock_state().running = false;
    }
}

/// Handle given to [`ModeLogic::execute`] for reporting actions and pacing.
pub struct ModeContext<'a> {
    mode: &'a Mode,
}

impl ModeContext<'_> {
    pub fn mode_name(&self) -> &str {
        self.mode.name()
    }

    /// Count one discrete remote action.
    pub fn record_action(&self, action_type: &str) {
        self.mode.record_action(action_type);
    }

    /// Whether the safety monitor allows an action of this class.
    pub fn check_safety_limits(&self, action_type: &str) -> bool {
        self.mode.check_safety_limits(action_type)
    }

    /// Actions recorded so far in this run.
    pub fn actions_this_run(&self) -> u32 {
        self.mode.actions_this_run()
    }

    /// Sleep for a random time within the mode's configured delay range.
    pub async fn human_delay(&self) {
        let range = self.mode.spec.delay_range;
        self.human_delay_between(range.min_secs, range.max_secs).await;
    }

    /// Sleep for a random time between `min_secs` and `max_secs`.
    pub async fn human_delay_between(&self, min_secs: u64, max_secs: u64) {
        let delay = if min_secs >= max_secs {
            min_secs as f64
        } else {
            rand::rng().random_range(min_secs as f64..=max_secs as f64)
        };
        tracing::debug!(mode = %self.mode.name(), delay_secs = delay, "Human delay");
        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
