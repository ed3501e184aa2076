//! Built-in modes and their construction from configuration.

pub mod connection_sync;
pub mod feed_engagement;
pub mod passive_listening;
pub mod post_response;

use std::sync::Arc;

use autopilot_core::config::AutopilotConfig;
use autopilot_core::safety::SafetyMonitor;
use serde::de::DeserializeOwned;

use crate::collaborator::Collaborators;
use crate::error::ModeError;
use crate::mode::{Mode, ModeSpec};
use crate::registry::Registry;

pub use connection_sync::{ConnectionSync, ConnectionSyncSettings};
pub use feed_engagement::{FeedEngagement, FeedEngagementSettings};
pub use passive_listening::{PassiveListening, PassiveListeningSettings};
pub use post_response::{PostResponse, PostResponseSettings};

pub const FEED_ENGAGEMENT: &str = "feed_engagement";
pub const POST_RESPONSE: &str = "post_response";
pub const CONNECTION_SYNC: &str = "connection_sync";
pub const PASSIVE_LISTENING: &str = "passive_listening";

/// Names of every built-in mode, in registration order.
pub const BUILTIN_MODES: [&str; 4] = [
    FEED_ENGAGEMENT,
    POST_RESPONSE,
    CONNECTION_SYNC,
    PASSIVE_LISTENING,
];

/// Decode a mode's flattened settings table into its typed settings.
pub fn decode_settings<T: DeserializeOwned>(settings: &toml::Table) -> Result<T, ModeError> {
    Ok(toml::Value::Table(settings.clone()).try_into()?)
}

/// Build the built-in mode called `name`, or `None` if there is no such mode.
pub fn build_mode(
    name: &str,
    config: &AutopilotConfig,
    collaborators: &Collaborators,
    safety: Option<Arc<dyn SafetyMonitor>>,
) -> Result<Option<Mode>, ModeError> {
    let mode_config = config.mode(name);
    let spec = ModeSpec::from_config(
        name,
        &mode_config,
        config.automation.scheduler.preferred_windows_for(name),
    );
    let settings = &mode_config.settings;
    let collaborators = collaborators.clone();

    let mode = match name {
        FEED_ENGAGEMENT => Mode::new(
            spec,
            FeedEngagement::new(decode_settings(settings)?, collaborators)?,
            safety,
        ),
        POST_RESPONSE => Mode::new(
            spec,
            PostResponse::new(decode_settings(settings)?, collaborators),
            safety,
        ),
        CONNECTION_SYNC => Mode::new(
            spec,
            ConnectionSync::new(decode_settings(settings)?, collaborators),
            safety,
        ),
        PASSIVE_LISTENING => Mode::new(
            spec,
            PassiveListening::new(decode_settings(settings)?, collaborators)?,
            safety,
        ),
        _ => return Ok(None),
    };
    Ok(Some(mode))
}

/// Register every built-in mode. Returns how many were registered.
pub fn register_builtin_modes(
    registry: &Registry,
    config: &AutopilotConfig,
    collaborators: &Collaborators,
    safety: Option<Arc<dyn SafetyMonitor>>,
) -> Result<usize, ModeError> {
    let mut registered = 0;
    for name in BUILTIN_MODES {
        if let Some(mode) = build_mode(name, config, collaborators, safety.clone())? {
            registry.register(mode);
            registered += 1;
        }
    }
    for name in config.modes.keys() {
        if !BUILTIN_MODES.contains(&name.as_str()) {
            tracing::warn!(mode = %name, "Configured mode has no implementation");
        }
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::types::FrequencyPolicy;

    fn config() -> AutopilotConfig {
        toml::from_str(
            r#"
            [automation]
            active_modes = ["post_response", "feed_engagement"]

            [automation.scheduler.time_windows]
            morning = [6, 12]

            [automation.scheduler.preferred_times]
            feed_engagement = ["morning"]

            [modes.feed_engagement]
            enabled = true
            engagement_frequency = "hourly"
            max_likes_per_session = 2

            [modes.post_response]
            enabled = true
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_known_mode_from_config() {
        let mode = build_mode(FEED_ENGAGEMENT, &config(), &Collaborators::simulated(), None)
            .unwrap()
            .unwrap();
        assert_eq!(mode.name(), FEED_ENGAGEMENT);
        assert!(mode.is_enabled());
        assert_eq!(mode.frequency(), FrequencyPolicy::Hourly);
        assert_eq!(mode.preferred_windows(), ["morning".to_string()]);
    }

    #[test]
    fn test_unconfigured_mode_is_disabled() {
        let mode = build_mode(CONNECTION_SYNC, &config(), &Collaborators::simulated(), None)
            .unwrap()
            .unwrap();
        assert!(!mode.is_enabled());
    }

    #[test]
    fn test_unknown_mode_builds_nothing() {
        let built = build_mode("group_networking", &config(), &Collaborators::simulated(), None).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_bad_settings_type_is_invalid_config() {
        let config: AutopilotConfig = toml::from_str(
            r#"
            [modes.feed_engagement]
            max_likes_per_session = "lots"
            "#,
        )
        .unwrap();
        let err = build_mode(FEED_ENGAGEMENT, &config, &Collaborators::simulated(), None).unwrap_err();
        assert!(matches!(err, ModeError::InvalidConfig(_)));
    }

    #[test]
    fn test_register_builtin_modes() {
        let config = config();
        let registry = Registry::from_config(&config.automation);
        let count =
            register_builtin_modes(&registry, &config, &Collaborators::simulated(), None).unwrap();
        assert_eq!(count, BUILTIN_MODES.len());
        let active: Vec<String> = registry
            .active_modes()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(active, vec!["post_response", "feed_engagement"]);
    }
}
