//! Name-keyed collection of modes.
//!
//! Iteration follows registration order so scheduling passes are
//! deterministic.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use autopilot_core::config::AutomationConfig;
use autopilot_core::types::ModeStats;

use crate::error::RegistryError;
use crate::mode::Mode;

#[derive(Default)]
struct RegistryInner {
    modes: Vec<Arc<Mode>>,
    full_automation: bool,
    /// Run order when full automation is off.
    active_mode_names: Vec<String>,
}

/// The set of registered modes plus the active-mode selection.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new(full_automation: bool, active_mode_names: Vec<String>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                modes: Vec::new(),
                full_automation,
                active_mode_names,
            }),
        }
    }

    pub fn from_config(config: &AutomationConfig) -> Self {
        Self::new(config.full_automation, config.active_modes.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a mode, replacing any mode with the same name in place.
    pub fn register(&self, mode: Mode) -> Arc<Mode> {
        let mode = Arc::new(mode);
        let mut inner = self.write();
        match inner.modes.iter_mut().find(|m| m.name() == mode.name()) {
            Some(slot) => {
                *slot = Arc::clone(&mode);
                tracing::info!(mode = %mode.name(), "Mode replaced");
            }
            None => {
                inner.modes.push(Arc::clone(&mode));
                tracing::info!(mode = %mode.name(), "Mode registered");
            }
        }
        mode
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Mode>> {
        let mut inner = self.write();
        let index = inner.modes.iter().position(|m| m.name() == name)?;
        tracing::info!(mode = %name, "Mode unregistered");
        Some(inner.modes.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mode>> {
        self.read().modes.iter().find(|m| m.name() == name).cloned()
    }

    /// Every registered mode, in registration order.
    pub fn modes(&self) -> Vec<Arc<Mode>> {
        self.read().modes.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().modes.iter().map(|m| m.name().to_string()).collect()
    }

    /// Enabled modes selected for running, in run order.
    ///
    /// With full automation every enabled mode is returned in registration
    /// order. Otherwise the modes named in the active list are returned in
    /// that list's order; unknown names are skipped.
    pub fn active_modes(&self) -> Vec<Arc<Mode>> {
        let inner = self.read();
        if inner.full_automation {
            return inner
                .modes
                .iter()
                .filter(|m| m.is_enabled())
                .cloned()
                .collect();
        }
        inner
            .active_mode_names
            .iter()
            .filter_map(|name| inner.modes.iter().find(|m| m.name() == name))
            .filter(|m| m.is_enabled())
            .cloned()
            .collect()
    }

    pub fn active_mode_names(&self) -> Vec<String> {
        self.read().active_mode_names.clone()
    }

    /// Enable a mode and append it to the active list if missing.
    pub fn enable_mode(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.write();
        let mode = inner
            .modes
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::ModeNotFound(name.to_string()))?;
        mode.enable();
        if !inner.active_mode_names.iter().any(|n| n == name) {
            inner.active_mode_names.push(name.to_string());
        }
        Ok(())
    }

    /// Disable a mode and drop it from the active list.
    pub fn disable_mode(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.write();
        let mode = inner
            .modes
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::ModeNotFound(name.to_string()))?;
        mode.disable();
        inner.active_mode_names.retain(|n| n != name);
        Ok(())
    }

    /// Clear the error count of every mode.
    pub fn reset_all_errors(&self) {
        for mode in self.modes() {
            mode.reset_errors();
        }
    }

    pub fn full_automation(&self) -> bool {
        self.read().full_automation
    }

    pub fn set_full_automation(&self, enabled: bool) {
        self.write().full_automation = enabled;
        tracing::info!(full_automation = enabled, "Automation scope changed");
    }

    pub fn mode_stats(&self) -> Vec<ModeStats> {
        self.modes().iter().map(|m| m.stats()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().modes.is_empty()
    }
}
