//! Error types for the orchestration core.

use autopilot_core::error::AutopilotError;

/// Errors returned by external collaborators (actuator, generator, store).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Remote action failed: {0}")]
    ActionFailed(String),
    #[error("Target not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures raised by a mode's own logic.
///
/// These never escape [`crate::Mode::start`]; they are converted into a
/// failed execution result and counted against the mode's error budget.
#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Actuator error: {0}")]
    Actuator(CollaboratorError),
    #[error("Content generation error: {0}")]
    Generator(CollaboratorError),
    #[error("Store error: {0}")]
    Store(CollaboratorError),
    #[error("Invalid mode configuration: {0}")]
    InvalidConfig(String),
    #[error("Mode panicked: {0}")]
    Panicked(String),
    #[error("Mode failed: {0}")]
    Failed(String),
}

impl From<AutopilotError> for ModeError {
    fn from(err: AutopilotError) -> Self {
        match err {
            AutopilotError::Config(msg) => ModeError::InvalidConfig(msg),
            other => ModeError::Failed(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for ModeError {
    fn from(err: toml::de::Error) -> Self {
        ModeError::InvalidConfig(err.to_string())
    }
}

/// Errors from registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Mode not registered: {0}")]
    ModeNotFound(String),
}

/// Errors from the background scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Background loop failed to join: {0}")]
    Join(String),
    #[error("Invalid scheduler configuration: {0}")]
    Config(#[from] AutopilotError),
}
