//! Connection sync: mirror the connections list into the store.

use async_trait::async_trait;
use autopilot_core::types::Metrics;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::collaborator::{Collaborators, Entity, RemoteItem, Surface, UpsertOutcome};
use crate::error::ModeError;
use crate::mode::{ModeContext, ModeLogic};

pub const CONNECTION_KIND: &str = "connection";

const PAGE_SIZE: usize = 20;
const MAX_PAGES: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSyncSettings {
    /// Stop after this many connections; 0 syncs everything.
    #[serde(alias = "max_connections_to_sync")]
    pub max_connections: u32,
}

pub struct ConnectionSync {
    settings: ConnectionSyncSettings,
    collaborators: Collaborators,
}

#[derive(Default)]
struct SyncCounters {
    scraped: u32,
    new: u32,
    updated: u32,
    errors: u32,
}

impl ConnectionSync {
    pub fn new(settings: ConnectionSyncSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    fn limit_reached(&self, scraped: u32) -> bool {
        self.settings.max_connections != 0 && scraped >= self.settings.max_connections
    }

    fn to_entity(item: RemoteItem) -> Entity {
        Entity {
            id: item.id,
            kind: CONNECTION_KIND.to_string(),
            name: item.text,
            attributes: item.attributes,
            discovered_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ModeLogic for ConnectionSync {
    async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
        let mut counters = SyncCounters::default();

        'pages: for _ in 0..MAX_PAGES {
            let page = self
                .collaborators
                .actuator
                .fetch(Surface::Connections, PAGE_SIZE)
                .await
                .map_err(ModeError::Actuator)?;
            if page.is_empty() {
                break;
            }

            for item in page {
                if self.limit_reached(counters.scraped) {
                    break 'pages;
                }
                counters.scraped += 1;
                let id = item.id.clone();
                match self.collaborators.store.upsert_entity(Self::to_entity(item)).await {
                    Ok(UpsertOutcome::Inserted) => counters.new += 1,
                    Ok(UpsertOutcome::Updated) => counters.updated += 1,
                    Ok(UpsertOutcome::Unchanged) => {}
                    Err(e) => {
                        tracing::warn!(connection = %id, error = %e, "Failed to sync connection");
                        counters.errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            mode = %ctx.mode_name(),
            new = counters.new,
            updated = counters.updated,
            errors = counters.errors,
            "Connection sync complete"
        );

        let mut metrics = Metrics::new();
        metrics.insert("scraped".to_string(), counters.scraped.into());
        metrics.insert("new".to_string(), counters.new.into());
        metrics.insert("updated".to_string(), counters.updated.into());
        metrics.insert("errors".to_string(), counters.errors.into());
        Ok(metrics)
    }
}
