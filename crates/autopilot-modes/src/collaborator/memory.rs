//! In-memory [`Store`] implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Entity, Store, UpsertOutcome};
use crate::error::CollaboratorError;

/// Process-local store; contents are lost on shutdown.
#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<HashSet<(String, String)>>,
    entities: Mutex<HashMap<(String, String), Entity>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger entries across all action types.
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().map(|l| l.len()).unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> CollaboratorError {
    CollaboratorError::Storage(format!("Lock poisoned: {}", e))
}

#[async_trait]
impl Store for MemoryStore {
    async fn has_action(
        &self,
        action_type: &str,
        target_id: &str,
    ) -> Result<bool, CollaboratorError> {
        let ledger = self.ledger.lock().map_err(poisoned)?;
        Ok(ledger.contains(&(action_type.to_string(), target_id.to_string())))
    }

    async fn record_action(
        &self,
        action_type: &str,
        target_id: &str,
    ) -> Result<(), CollaboratorError> {
        let mut ledger = self.ledger.lock().map_err(poisoned)?;
        ledger.insert((action_type.to_string(), target_id.to_string()));
        Ok(())
    }

    async fn upsert_entity(&self, entity: Entity) -> Result<UpsertOutcome, CollaboratorError> {
        let mut entities = self.entities.lock().map_err(poisoned)?;
        let key = (entity.kind.clone(), entity.id.clone());
        match entities.get_mut(&key) {
            Some(existing) => {
                if existing.name == entity.name && existing.attributes == entity.attributes {
                    Ok(UpsertOutcome::Unchanged)
                } else {
                    existing.name = entity.name;
                    existing.attributes = entity.attributes;
                    Ok(UpsertOutcome::Updated)
                }
            }
            None => {
                entities.insert(key, entity);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn entity_count(&self, kind: &str) -> Result<usize, CollaboratorError> {
        let entities = self.entities.lock().map_err(poisoned)?;
        Ok(entities.keys().filter(|(k, _)| k == kind).count())
    }
}
