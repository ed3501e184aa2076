use thiserror::Error;

/// Top-level error type for the Autopilot system.
///
/// Subsystem crates define their own error types and convert into this one
/// where a failure has to cross a crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AutopilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Safety monitor error: {0}")]
    Safety(String),
}

impl From<toml::de::Error> for AutopilotError {
    fn from(err: toml::de::Error) -> Self {
        AutopilotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AutopilotError {
    fn from(err: toml::ser::Error) -> Self {
        AutopilotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AutopilotError {
    fn from(err: serde_json::Error) -> Self {
        AutopilotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Autopilot operations.
pub type Result<T> = std::result::Result<T, AutopilotError>;
