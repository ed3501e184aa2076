//! Passive listening: scan the feed for monitored keywords without acting.

use std::collections::BTreeMap;

use async_trait::async_trait;
use autopilot_core::types::Metrics;
use serde::{Deserialize, Serialize};

use crate::collaborator::{Collaborators, Surface};
use crate::error::ModeError;
use crate::keywords::KeywordFilter;
use crate::mode::{ModeContext, ModeLogic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveListeningSettings {
    #[serde(alias = "keywords")]
    pub monitor_keywords: Vec<String>,
    pub max_items: u32,
}

impl Default for PassiveListeningSettings {
    fn default() -> Self {
        Self {
            monitor_keywords: Vec::new(),
            max_items: 25,
        }
    }
}

pub struct PassiveListening {
    settings: PassiveListeningSettings,
    filter: KeywordFilter,
    collaborators: Collaborators,
}

impl PassiveListening {
    pub fn new(
        settings: PassiveListeningSettings,
        collaborators: Collaborators,
    ) -> Result<Self, ModeError> {
        let filter = KeywordFilter::new(&settings.monitor_keywords, &[])?;
        Ok(Self {
            settings,
            filter,
            collaborators,
        })
    }
}

#[async_trait]
impl ModeLogic for PassiveListening {
    async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
        let items = self
            .collaborators
            .actuator
            .fetch(Surface::Feed, self.settings.max_items as usize)
            .await
            .map_err(ModeError::Actuator)?;

        let mut matches = 0u32;
        let mut mentions: BTreeMap<String, u32> = BTreeMap::new();
        if !self.settings.monitor_keywords.is_empty() {
            for item in &items {
                let found = self.filter.matched_targets(&item.text);
                if found.is_empty() {
                    continue;
                }
                matches += 1;
                for keyword in found {
                    *mentions.entry(keyword).or_default() += 1;
                }
            }
        }
        tracing::debug!(mode = %ctx.mode_name(), scanned = items.len(), matches, "Listening pass finished");

        let mut metrics = Metrics::new();
        metrics.insert(
            "keywords_tracked".to_string(),
            self.settings.monitor_keywords.len().into(),
        );
        metrics.insert("items_scanned".to_string(), items.len().into());
        metrics.insert("matches".to_string(), matches.into());
        metrics.insert(
            "mentions".to_string(),
            serde_json::to_value(&mentions).map_err(|e| ModeError::Failed(e.to_string()))?,
        );
        Ok(metrics)
    }
}
