//! Shared configuration, error, and value types for Autopilot.
//!
//! Also defines the [`SafetyMonitor`] capability every mode is checked
//! against, together with a reference in-memory rate limiter.

pub mod config;
pub mod error;
pub mod safety;
pub mod types;

pub use config::AutopilotConfig;
pub use error::{AutopilotError, Result};
pub use safety::{run_action, RateLimitMonitor, SafetyMonitor};
pub use types::*;
