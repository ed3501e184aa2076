//! Scheduler: on-demand runs and the time-driven background loop.
//!
//! Modes always run one after another, never concurrently, with a delay
//! between them. The background loop evaluates eligibility once per poll
//! interval; a stop request prevents new triggers but never interrupts a
//! mode that is already executing.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autopilot_core::config::AutomationConfig;
use autopilot_core::types::{
    AutomationStats, ExecutionResult, ManagerStats, RejectReason, TimeWindow,
};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::mode::{panic_message, Mode};
use crate::registry::Registry;

/// Timing and window settings for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Whether ticks trigger modes at all.
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Delay between two triggers within one tick.
    pub trigger_spacing: Duration,
    /// Delay between modes in [`Scheduler::run_all_active`].
    pub inter_mode_delay: Duration,
    /// How long a stop waits before warning that a run is still finishing.
    pub stop_timeout: Duration,
    pub mode_rotation: String,
    pub time_windows: Vec<TimeWindow>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            trigger_spacing: Duration::from_secs(30),
            inter_mode_delay: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
            mode_rotation: "balanced".to_string(),
            time_windows: Vec::new(),
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &AutomationConfig) -> Result<Self, SchedulerError> {
        let scheduler = &config.scheduler;
        Ok(Self {
            enabled: scheduler.enabled,
            poll_interval: Duration::from_secs(scheduler.poll_interval_secs),
            trigger_spacing: Duration::from_secs(scheduler.trigger_spacing_secs),
            inter_mode_delay: Duration::from_secs(config.safety.delay_range.max_secs),
            stop_timeout: Duration::from_secs(scheduler.stop_timeout_secs),
            mode_rotation: scheduler.mode_rotation.clone(),
            time_windows: scheduler.time_windows()?,
        })
    }
}

/// Completion of the loop task, awaitable by every concurrent stop.
type LoopJoin = Shared<BoxFuture<'static, Result<(), String>>>;

/// The loop counts as running until its task has been joined.
enum LoopState {
    Idle,
    Running {
        cancel: CancellationToken,
        join: LoopJoin,
    },
    Stopping(LoopJoin),
}

/// Decides when modes run and drives them.
pub struct Scheduler {
    registry: Arc<Registry>,
    settings: SchedulerSettings,
    worker: Mutex<LoopState>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, settings: SchedulerSettings) -> Self {
        Self {
            registry,
            settings,
            worker: Mutex::new(LoopState::Idle),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    fn lock_worker(&self) -> MutexGuard<'_, LoopState> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =====================================================================
    // On-demand execution
    // =====================================================================

    /// Run one mode by name.
    pub async fn run_mode(&self, name: &str) -> ExecutionResult {
        match self.registry.get(name) {
            Some(mode) => {
                tracing::info!(mode = %name, "Running mode on demand");
                mode.start().await
            }
            None => {
                tracing::warn!(mode = %name, "Requested mode is not registered");
                ExecutionResult::rejected(name, RejectReason::NotFound)
            }
        }
    }

    /// Run every active mode once, in order, pausing between modes.
    pub async fn run_all_active(&self) -> Vec<ExecutionResult> {
        let modes = self.registry.active_modes();
        let mut results = Vec::with_capacity(modes.len());
        for (i, mode) in modes.iter().enumerate() {
            if i > 0 {
                tracing::debug!(delay_secs = self.settings.inter_mode_delay.as_secs(), "Delay between modes");
                tokio::time::sleep(self.settings.inter_mode_delay).await;
            }
            tracing::info!(mode = %mode.name(), "Running active mode");
            results.push(mode.start().await);
        }
        results
    }

    // =====================================================================
    // Eligibility
    // =====================================================================

    /// Names of configured windows containing `hour`.
    pub fn satisfied_windows(&self, hour: u32) -> HashSet<&str> {
        self.settings
            .time_windows
            .iter()
            .filter(|w| w.contains_hour(hour))
            .map(|w| w.name.as_str())
            .collect()
    }

    fn is_known_window(&self, name: &str) -> bool {
        self.settings.time_windows.iter().any(|w| w.name == name)
    }

    /// Active modes allowed to run at `hour` by their window preferences.
    ///
    /// Falls back to every active mode when the filter leaves nothing.
    /// Preferences naming an undefined window impose no restriction.
    pub fn time_eligible_modes(&self, hour: u32) -> Vec<Arc<Mode>> {
        let active = self.registry.active_modes();
        let satisfied = self.satisfied_windows(hour);
        if satisfied.is_empty() {
            return active;
        }

        let preferred: Vec<Arc<Mode>> = active
            .iter()
            .filter(|mode| {
                let windows = mode.preferred_windows();
                windows.is_empty()
                    || windows
                        .iter()
                        .any(|w| satisfied.contains(w.as_str()) || !self.is_known_window(w))
            })
            .cloned()
            .collect();

        if preferred.is_empty() {
            tracing::debug!(hour, "No mode prefers the current windows; using all active modes");
            return active;
        }
        preferred
    }

    /// Modes the background loop would trigger at `now`.
    ///
    /// Window checks use the hour of `now` in its own time zone; frequency
    /// checks compare against each mode's last run.
    pub fn due_modes<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<Arc<Mode>> {
        let now_utc = now.with_timezone(&Utc);
        self.time_eligible_modes(now.hour())
            .into_iter()
            .filter(|mode| mode.frequency().is_due(mode.last_run_at(), now_utc) && mode.can_run())
            .collect()
    }

    // =====================================================================
    // Background loop
    // =====================================================================

    /// One scheduling pass. Returns how many modes were triggered.
    ///
    /// Cancellation is only observed between triggers.
    pub async fn tick(&self, cancel: &CancellationToken) -> usize {
        let due = self.due_modes(&Local::now());
        let mut triggered = 0;
        for (i, mode) in due.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.trigger_spacing) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            tracing::info!(mode = %mode.name(), "Scheduler triggering mode");
            let result = mode.start().await;
            if result.success {
                tracing::info!(mode = %result.mode_name, actions = result.actions_performed, "Scheduled run finished");
            } else {
                tracing::warn!(
                    mode = %result.mode_name,
                    error = result.error_message.as_deref().unwrap_or("unknown"),
                    "Scheduled run did not succeed"
                );
            }
            triggered += 1;
        }
        triggered
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            enabled = self.settings.enabled,
            "Scheduler loop started"
        );
        while !cancel.is_cancelled() {
            if self.settings.enabled {
                match AssertUnwindSafe(self.tick(&cancel)).catch_unwind().await {
                    Ok(triggered) => tracing::debug!(triggered, "Scheduler tick finished"),
                    Err(panic) => tracing::error!(
                        error = %panic_message(panic.as_ref()),
                        "Scheduler tick failed"
                    ),
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        tracing::info!("Scheduler loop stopped");
    }

    /// Spawn the background loop on the current tokio runtime.
    ///
    /// Returns `false`, with a warning, if the loop is already running or a
    /// stop is still waiting for it to exit.
    pub fn start_background_loop(self: &Arc<Self>) -> bool {
        let mut worker = self.lock_worker();
        match *worker {
            LoopState::Running { .. } => {
                tracing::warn!("Background loop already running");
                return false;
            }
            LoopState::Stopping(_) => {
                tracing::warn!("Background loop is still stopping");
                return false;
            }
            LoopState::Idle => {}
        }
        let cancel = CancellationToken::new();
        let join = tokio::spawn(Arc::clone(self).run_loop(cancel.clone()))
            .map(|joined| joined.map_err(|e| e.to_string()))
            .boxed()
            .shared();
        *worker = LoopState::Running { cancel, join };
        tracing::info!("Background automation started");
        true
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// A mode already executing is allowed to finish. If that takes longer
    /// than the stop timeout a warning is logged and the wait continues, so
    /// this never returns while the loop can still start a mode. Concurrent
    /// stops all wait for the same exit.
    pub async fn stop_background_loop(&self) -> Result<(), SchedulerError> {
        let join = {
            let mut worker = self.lock_worker();
            match std::mem::replace(&mut *worker, LoopState::Idle) {
                LoopState::Idle => {
                    tracing::debug!("Background loop not running");
                    return Ok(());
                }
                LoopState::Running { cancel, join } => {
                    cancel.cancel();
                    *worker = LoopState::Stopping(join.clone());
                    join
                }
                LoopState::Stopping(join) => {
                    *worker = LoopState::Stopping(join.clone());
                    join
                }
            }
        };

        let joined = match tokio::time::timeout(self.settings.stop_timeout, join.clone()).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.stop_timeout.as_secs(),
                    "Background loop still finishing a mode run"
                );
                join.clone().await
            }
        };

        {
            let mut worker = self.lock_worker();
            if matches!(&*worker, LoopState::Stopping(current) if current.ptr_eq(&join)) {
                *worker = LoopState::Idle;
            }
        }
        joined.map_err(SchedulerError::Join)?;
        tracing::info!("Background automation stopped");
        Ok(())
    }

    /// True from start until the loop task has been joined by a stop.
    pub fn is_running(&self) -> bool {
        !matches!(*self.lock_worker(), LoopState::Idle)
    }

    /// Read-only snapshot of manager and mode state.
    pub fn stats(&self) -> AutomationStats {
        AutomationStats {
            manager: ManagerStats {
                running: self.is_running(),
                full_automation: self.registry.full_automation(),
                scheduler_enabled: self.settings.enabled,
                mode_rotation: self.settings.mode_rotation.clone(),
                total_modes: self.registry.len(),
                active_modes: self.registry.active_modes().len(),
            },
            modes: self.registry.mode_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModeError;
    use crate::mode::{ModeContext, ModeLogic, ModeSpec};
    use async_trait::async_trait;
    use autopilot_core::safety::SafetyMonitor;
    use autopilot_core::types::{FrequencyPolicy, Metrics};
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;
    use tokio::time::Instant;

    /// Records the paused-clock instant of each execution.
    struct Recording {
        starts: Arc<Mutex<Vec<(String, Instant)>>>,
    }

    #[async_trait]
    impl ModeLogic for Recording {
        async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
            self.starts
                .lock()
                .unwrap()
                .push((ctx.mode_name().to_string(), Instant::now()));
            Ok(Metrics::new())
        }
    }

    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl ModeLogic for Counting {
        async fn execute(&self, _ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Metrics::new())
        }
    }

    struct Gated {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        finished: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ModeLogic for Gated {
        async fn execute(&self, _ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(Metrics::new())
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            inter_mode_delay: Duration::from_secs(10),
            time_windows: vec![
                TimeWindow::new("morning", 6, 12).unwrap(),
                TimeWindow::new("evening", 17, 21).unwrap(),
            ],
            ..SchedulerSettings::default()
        }
    }

    fn noop(spec: ModeSpec) -> Mode {
        Mode::new(spec, Counting(Arc::new(AtomicU32::new(0))), None)
    }

    fn names(modes: &[Arc<Mode>]) -> Vec<&str> {
        modes.iter().map(|m| m.name()).collect()
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    // =====================================================================
    // On-demand execution
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_run_all_active_in_order_with_delay_between() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(Registry::new(true, Vec::new()));
        for name in ["a", "b", "c"] {
            registry.register(Mode::new(
                ModeSpec::new(name),
                Recording {
                    starts: Arc::clone(&starts),
                },
                None,
            ));
        }
        let scheduler = Scheduler::new(registry, settings());

        let before = Instant::now();
        let results = scheduler.run_all_active().await;
        let elapsed = before.elapsed();

        let order: Vec<&str> = results.iter().map(|r| r.mode_name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.success));

        let starts = starts.lock().unwrap();
        assert_eq!(starts[1].1 - starts[0].1, Duration::from_secs(10));
        assert_eq!(starts[2].1 - starts[1].1, Duration::from_secs(10));
        // No delay after the last mode.
        assert_eq!(elapsed, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_run_all_active_collects_failures_and_rejections() {
        struct Failing;

        #[async_trait]
        impl ModeLogic for Failing {
            async fn execute(&self, _ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
                Err(ModeError::Failed("remote error".to_string()))
            }
        }

        let registry = Arc::new(Registry::new(false, vec!["ok".into(), "bad".into()]));
        registry.register(noop(ModeSpec::new("ok")));
        registry.register(Mode::new(ModeSpec::new("bad"), Failing, None));
        let scheduler = Scheduler::new(
            registry,
            SchedulerSettings {
                inter_mode_delay: Duration::ZERO,
                ..settings()
            },
        );
        let results = scheduler.run_all_active().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[tokio::test]
    async fn test_run_mode_unknown_is_not_found() {
        let scheduler = Scheduler::new(Arc::new(Registry::default()), settings());
        let result = scheduler.run_mode("ghost").await;
        assert!(!result.success);
        assert_eq!(result.rejection, Some(RejectReason::NotFound));
        assert_eq!(result.mode_name, "ghost");
    }

    #[tokio::test]
    async fn test_run_mode_runs_manual_mode() {
        let count = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(Registry::default());
        registry.register(Mode::new(
            ModeSpec::new("m").with_frequency(FrequencyPolicy::Manual),
            Counting(Arc::clone(&count)),
            None,
        ));
        let scheduler = Scheduler::new(registry, settings());
        assert!(scheduler.run_mode("m").await.success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // =====================================================================
    // Eligibility
    // =====================================================================

    #[test]
    fn test_satisfied_windows() {
        let scheduler = Scheduler::new(Arc::new(Registry::default()), settings());
        assert!(scheduler.satisfied_windows(9).contains("morning"));
        assert!(scheduler.satisfied_windows(13).is_empty());
        assert!(scheduler.satisfied_windows(12).is_empty());
        assert!(scheduler.satisfied_windows(6).contains("morning"));
    }

    #[test]
    fn test_mode_without_preference_always_eligible() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(noop(ModeSpec::new("free")));
        registry.register(noop(
            ModeSpec::new("am").with_preferred_windows(vec!["morning".into()]),
        ));
        let scheduler = Scheduler::new(registry, settings());

        assert_eq!(names(&scheduler.time_eligible_modes(9)), vec!["free", "am"]);
        // Nothing satisfied at 13: no restriction applies.
        assert_eq!(names(&scheduler.time_eligible_modes(13)), vec!["free", "am"]);
        assert_eq!(names(&scheduler.time_eligible_modes(18)), vec!["free"]);
    }

    #[test]
    fn test_empty_filter_falls_back_to_all_active() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(noop(
            ModeSpec::new("pm").with_preferred_windows(vec!["evening".into()]),
        ));
        let scheduler = Scheduler::new(registry, settings());
        assert_eq!(names(&scheduler.time_eligible_modes(9)), vec!["pm"]);
    }

    #[test]
    fn test_unknown_preferred_window_is_no_restriction() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(noop(
            ModeSpec::new("odd").with_preferred_windows(vec!["lunch".into()]),
        ));
        registry.register(noop(
            ModeSpec::new("pm").with_preferred_windows(vec!["evening".into()]),
        ));
        let scheduler = Scheduler::new(registry, settings());
        assert_eq!(names(&scheduler.time_eligible_modes(9)), vec!["odd"]);
    }

    #[test]
    fn test_no_windows_configured_means_all_eligible() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(noop(
            ModeSpec::new("am").with_preferred_windows(vec!["morning".into()]),
        ));
        let scheduler = Scheduler::new(registry, SchedulerSettings::default());
        assert_eq!(names(&scheduler.time_eligible_modes(3)), vec!["am"]);
    }

    #[test]
    fn test_daily_frequency_gate() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        let mode = registry.register(noop(ModeSpec::new("daily")));
        let scheduler = Scheduler::new(registry, SchedulerSettings::default());
        let now = at_hour(10);

        mode.restore_last_run(Some(now - ChronoDuration::hours(23)));
        assert!(scheduler.due_modes(&now).is_empty());

        mode.restore_last_run(Some(now - ChronoDuration::hours(25)));
        assert_eq!(names(&scheduler.due_modes(&now)), vec!["daily"]);
    }

    #[test]
    fn test_manual_never_due_and_guard_applies() {
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(noop(
            ModeSpec::new("manual").with_frequency(FrequencyPolicy::Manual),
        ));
        let paused = registry.register(noop(
            ModeSpec::new("paused").with_frequency(FrequencyPolicy::Hourly),
        ));
        let scheduler = Scheduler::new(Arc::clone(&registry), SchedulerSettings::default());
        assert_eq!(names(&scheduler.due_modes(&at_hour(10))), vec!["paused"]);

        paused.disable();
        assert!(scheduler.due_modes(&at_hour(10)).is_empty());
    }

    // =====================================================================
    // Background loop
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_loop_start_stop_idempotent() {
        let count = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(Mode::new(
            ModeSpec::new("hourly").with_frequency(FrequencyPolicy::Hourly),
            Counting(Arc::clone(&count)),
            None,
        ));
        let scheduler = Arc::new(Scheduler::new(registry, SchedulerSettings::default()));

        assert!(scheduler.start_background_loop());
        assert!(!scheduler.start_background_loop());
        assert!(scheduler.is_running());
        assert!(scheduler.stats().manager.running);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.stop_background_loop().await.unwrap();
        assert!(!scheduler.is_running());
        scheduler.stop_background_loop().await.unwrap();

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_spaces_triggers_within_tick() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(Registry::new(true, Vec::new()));
        for name in ["a", "b"] {
            registry.register(Mode::new(
                ModeSpec::new(name),
                Recording {
                    starts: Arc::clone(&starts),
                },
                None,
            ));
        }
        let scheduler = Arc::new(Scheduler::new(registry, SchedulerSettings::default()));
        scheduler.start_background_loop();
        tokio::time::sleep(Duration::from_secs(45)).await;
        scheduler.stop_background_loop().await.unwrap();

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].1 - starts[0].1, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_run() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(Mode::new(
            ModeSpec::new("slow"),
            Gated {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
                finished: Arc::clone(&finished),
            },
            None,
        ));
        let scheduler = Arc::new(Scheduler::new(registry, SchedulerSettings::default()));
        scheduler.start_background_loop();
        entered.notified().await;

        let stop = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.stop_background_loop().await }
        });
        // Past the stop timeout; the stop keeps waiting.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!stop.is_finished());
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        release.notify_one();
        stop.await.unwrap().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_refused_until_stop_joins() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(Mode::new(
            ModeSpec::new("slow"),
            Gated {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
                finished: Arc::clone(&finished),
            },
            None,
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&registry),
            SchedulerSettings::default(),
        ));
        scheduler.start_background_loop();
        entered.notified().await;

        let spawn_stop = || {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.stop_background_loop().await })
        };
        let first_stop = spawn_stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let other = Arc::new(AtomicU32::new(0));
        registry.register(Mode::new(
            ModeSpec::new("other"),
            Counting(Arc::clone(&other)),
            None,
        ));
        assert!(scheduler.is_running());
        assert!(!scheduler.start_background_loop());

        let second_stop = spawn_stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!first_stop.is_finished());
        assert!(!second_stop.is_finished());
        assert_eq!(other.load(Ordering::SeqCst), 0);

        release.notify_one();
        first_stop.await.unwrap().unwrap();
        second_stop.await.unwrap().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_running());

        // Once joined, the loop can be started again.
        assert!(scheduler.start_background_loop());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(other.load(Ordering::SeqCst), 1);
        scheduler.stop_background_loop().await.unwrap();
    }

    /// Panics on the first `panics` checks, then allows everything.
    struct FlakyMonitor {
        panics: AtomicU32,
    }

    impl SafetyMonitor for FlakyMonitor {
        fn can_perform_action(&self, _action_type: &str) -> bool {
            if self
                .panics
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                panic!("monitor backend unavailable");
            }
            true
        }

        fn record_action(&self, _action_type: &str) -> autopilot_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_continues_after_panicking_tick() {
        let count = Arc::new(AtomicU32::new(0));
        let safety: Arc<dyn SafetyMonitor> = Arc::new(FlakyMonitor {
            panics: AtomicU32::new(1),
        });
        let registry = Arc::new(Registry::new(true, Vec::new()));
        registry.register(Mode::new(
            ModeSpec::new("hourly").with_frequency(FrequencyPolicy::Hourly),
            Counting(Arc::clone(&count)),
            Some(safety),
        ));
        let scheduler = Arc::new(Scheduler::new(registry, SchedulerSettings::default()));
        scheduler.start_background_loop();

        // The first tick panics while checking the run guard.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_running());

        // The next tick, one poll interval later, runs the mode.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        scheduler.stop_background_loop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let registry = Arc::new(Registry::new(false, vec!["a".into()]));
        registry.register(noop(ModeSpec::new("a")));
        registry.register(noop(ModeSpec::new("b")));
        let scheduler = Scheduler::new(registry, settings());
        let stats = scheduler.stats();
        assert!(!stats.manager.running);
        assert!(!stats.manager.full_automation);
        assert!(stats.manager.scheduler_enabled);
        assert_eq!(stats.manager.mode_rotation, "balanced");
        assert_eq!(stats.manager.total_modes, 2);
        assert_eq!(stats.manager.active_modes, 1);
        assert_eq!(stats.modes.len(), 2);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AutomationConfig::default();
        config.safety.delay_range = autopilot_core::config::DelayRange::new(5, 45);
        config
            .scheduler
            .time_windows
            .insert("morning".to_string(), [6, 12]);
        let settings = SchedulerSettings::from_config(&config).unwrap();
        assert_eq!(settings.inter_mode_delay, Duration::from_secs(45));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.time_windows.len(), 1);

        config.scheduler.time_windows.insert("bad".to_string(), [25, 3]);
        assert!(matches!(
            SchedulerSettings::from_config(&config),
            Err(SchedulerError::Config(_))
        ));
    }
}
