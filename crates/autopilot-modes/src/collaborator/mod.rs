//! Capabilities concrete modes use to act on the outside world.
//!
//! Only `ModeLogic::execute` implementations touch these. The registry and
//! scheduler never see them.

pub mod memory;
pub mod simulated;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

pub use memory::MemoryStore;
pub use simulated::{SimulatedActuator, TemplateGenerator};

/// A remote listing the actuator can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// The home feed.
    Feed,
    /// Comments left on the operator's own posts.
    OwnPostComments,
    /// The operator's connections list.
    Connections,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Feed => write!(f, "feed"),
            Surface::OwnPostComments => write!(f, "own_post_comments"),
            Surface::Connections => write!(f, "connections"),
        }
    }
}

/// One item read from a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub author: Option<String>,
    pub text: String,
    /// The containing post for comments.
    pub parent_id: Option<String>,
    /// Free-form attributes such as title or company.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Kinds of discrete remote actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteActionKind {
    Like,
    Comment,
    Reply,
}

impl fmt::Display for RemoteActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteActionKind::Like => write!(f, "like"),
            RemoteActionKind::Comment => write!(f, "comment"),
            RemoteActionKind::Reply => write!(f, "reply"),
        }
    }
}

/// A remote action to perform against a target item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAction {
    pub kind: RemoteActionKind,
    pub target_id: String,
    pub text: Option<String>,
}

impl RemoteAction {
    pub fn like(target_id: impl Into<String>) -> Self {
        Self {
            kind: RemoteActionKind::Like,
            target_id: target_id.into(),
            text: None,
        }
    }

    pub fn comment(target_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: RemoteActionKind::Comment,
            target_id: target_id.into(),
            text: Some(text.into()),
        }
    }

    pub fn reply(target_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: RemoteActionKind::Reply,
            target_id: target_id.into(),
            text: Some(text.into()),
        }
    }
}

/// Performs remote interactions and reads remote listings.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Read the next batch of up to `limit` items from `surface`.
    ///
    /// Successive calls continue where the previous batch ended; an empty
    /// batch means the surface is exhausted.
    async fn fetch(&self, surface: Surface, limit: usize)
        -> Result<Vec<RemoteItem>, CollaboratorError>;

    /// Perform one remote action.
    async fn perform(&self, action: &RemoteAction) -> Result<(), CollaboratorError>;
}

/// Voice of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Supportive,
    Friendly,
    Professional,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Supportive => write!(f, "supportive"),
            Tone::Friendly => write!(f, "friendly"),
            Tone::Professional => write!(f, "professional"),
        }
    }
}

/// Produces natural-language content.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate text in response to `source`, at most `max_length` characters.
    async fn generate_text(
        &self,
        source: &str,
        tone: Tone,
        max_length: usize,
    ) -> Result<String, CollaboratorError>;
}

/// A discovered remote entity, such as a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub discovered_at: DateTime<Utc>,
}

/// What an upsert did to the stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Durable entity storage plus an action-history ledger.
///
/// The ledger is keyed by `(action_type, target_id)` so modes can skip
/// targets they already acted on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn has_action(&self, action_type: &str, target_id: &str)
        -> Result<bool, CollaboratorError>;

    async fn record_action(&self, action_type: &str, target_id: &str)
        -> Result<(), CollaboratorError>;

    async fn upsert_entity(&self, entity: Entity) -> Result<UpsertOutcome, CollaboratorError>;

    async fn entity_count(&self, kind: &str) -> Result<usize, CollaboratorError>;
}

/// The collaborator set handed to built-in modes at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub actuator: Arc<dyn Actuator>,
    pub generator: Arc<dyn ContentGenerator>,
    pub store: Arc<dyn Store>,
}

impl Collaborators {
    /// Simulated actuator, template generator, and in-memory store.
    pub fn simulated() -> Self {
        Self {
            actuator: Arc::new(SimulatedActuator::default()),
            generator: Arc::new(TemplateGenerator),
            store: Arc::new(MemoryStore::new()),
        }
    }
}
