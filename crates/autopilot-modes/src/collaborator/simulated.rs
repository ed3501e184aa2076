//! Simulated collaborators for running without a browser or model.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Actuator, ContentGenerator, RemoteAction, RemoteItem, Surface, Tone};
use crate::error::CollaboratorError;

const SAMPLE_POSTS: [&str; 6] = [
    "Shipped our new Rust service today. Latency dropped by forty percent after removing the GC pauses.",
    "Hiring: senior backend engineers who enjoy distributed systems and on-call sanity.",
    "Hot take: most dashboards are never read. Alert on symptoms, not causes.",
    "Weekend reading list on async runtimes and structured concurrency.",
    "Congrats to the team on the launch!",
    "Lessons from migrating a monolith to services: start with the data, not the code.",
];

/// Actuator backed by canned listings.
///
/// Each surface is read through a cursor, so repeated fetches page through
/// the listing and then return empty batches. Performed actions are kept
/// for inspection.
pub struct SimulatedActuator {
    listings: HashMap<Surface, Vec<RemoteItem>>,
    cursors: Mutex<HashMap<Surface, usize>>,
    performed: Mutex<Vec<RemoteAction>>,
    unavailable: bool,
}

impl SimulatedActuator {
    /// An actuator with empty listings.
    pub fn empty() -> Self {
        Self {
            listings: HashMap::new(),
            cursors: Mutex::new(HashMap::new()),
            performed: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    /// Replace the listing for `surface`.
    pub fn with_items(mut self, surface: Surface, items: Vec<RemoteItem>) -> Self {
        self.listings.insert(surface, items);
        self
    }

    /// Make every call fail as if the remote session were gone.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Actions performed so far, in order.
    pub fn performed(&self) -> Vec<RemoteAction> {
        self.performed
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.unavailable {
            return Err(CollaboratorError::Unavailable(
                "simulated session closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SimulatedActuator {
    fn default() -> Self {
        let feed = (0..12)
            .map(|i| RemoteItem {
                id: format!("post-{}", i),
                author: Some(format!("member-{}", i % 5)),
                text: SAMPLE_POSTS[i % SAMPLE_POSTS.len()].to_string(),
                parent_id: None,
                attributes: serde_json::Map::new(),
            })
            .collect();

        let comments = (0..4)
            .map(|i| RemoteItem {
                id: format!("comment-{}", i),
                author: Some(format!("reader-{}", i)),
                text: if i == 3 {
                    "+1".to_string()
                } else {
                    "Really useful write-up, how did you measure the latency change?".to_string()
                },
                parent_id: Some(format!("own-post-{}", i % 2)),
                attributes: serde_json::Map::new(),
            })
            .collect();

        let connections = (0..5)
            .map(|i| {
                let mut attributes = serde_json::Map::new();
                attributes.insert("title".to_string(), "Engineer".into());
                attributes.insert("company".to_string(), format!("Company {}", i).into());
                RemoteItem {
                    id: format!("profile-{}", i),
                    author: None,
                    text: format!("Connection {}", i),
                    parent_id: None,
                    attributes,
                }
            })
            .collect();

        Self::empty()
            .with_items(Surface::Feed, feed)
            .with_items(Surface::OwnPostComments, comments)
            .with_items(Surface::Connections, connections)
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn fetch(
        &self,
        surface: Surface,
        limit: usize,
    ) -> Result<Vec<RemoteItem>, CollaboratorError> {
        self.check_available()?;
        let Some(items) = self.listings.get(&surface) else {
            return Ok(Vec::new());
        };
        let mut cursors = self
            .cursors
            .lock()
            .map_err(|e| CollaboratorError::Unavailable(format!("Lock poisoned: {}", e)))?;
        let cursor = cursors.entry(surface).or_insert(0);
        let start = (*cursor).min(items.len());
        let end = (start + limit).min(items.len());
        *cursor = end;
        tracing::debug!(%surface, start, end, "Simulated fetch");
        Ok(items[start..end].to_vec())
    }

    async fn perform(&self, action: &RemoteAction) -> Result<(), CollaboratorError> {
        self.check_available()?;
        tracing::debug!(kind = %action.kind, target = %action.target_id, "Simulated action");
        self.performed
            .lock()
            .map_err(|e| CollaboratorError::ActionFailed(format!("Lock poisoned: {}", e)))?
            .push(action.clone());
        Ok(())
    }
}

/// Generator that fills fixed templates instead of calling a model.
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate_text(
        &self,
        source: &str,
        tone: Tone,
        max_length: usize,
    ) -> Result<String, CollaboratorError> {
        let topic: Vec<&str> = source.split_whitespace().take(6).collect();
        let topic = topic.join(" ");
        let text = match tone {
            Tone::Supportive => format!("Great point about \"{}\". Thanks for sharing this!", topic),
            Tone::Friendly => format!("Thanks for the comment! Glad \"{}\" resonated.", topic),
            Tone::Professional => format!("Appreciate the perspective on \"{}\".", topic),
        };
        Ok(text.chars().take(max_length).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_pages_through_listing() {
        let actuator = SimulatedActuator::default();
        let first = actuator.fetch(Surface::Feed, 5).await.unwrap();
        let second = actuator.fetch(Surface::Feed, 5).await.unwrap();
        let third = actuator.fetch(Surface::Feed, 5).await.unwrap();
        let fourth = actuator.fetch(Surface::Feed, 5).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        assert_eq!(third.len(), 2);
        assert!(fourth.is_empty());
        assert_eq!(first[0].id, "post-0");
        assert_eq!(second[0].id, "post-5");
    }

    #[tokio::test]
    async fn test_perform_records_actions() {
        let actuator = SimulatedActuator::empty();
        actuator.perform(&RemoteAction::like("post-1")).await.unwrap();
        assert_eq!(actuator.performed(), vec![RemoteAction::like("post-1")]);
    }

    #[tokio::test]
    async fn test_unavailable_fails() {
        let actuator = SimulatedActuator::default().unavailable();
        assert!(matches!(
            actuator.fetch(Surface::Feed, 1).await,
            Err(CollaboratorError::Unavailable(_))
        ));
        assert!(actuator.perform(&RemoteAction::like("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_template_generator_respects_max_length() {
        let text = TemplateGenerator
            .generate_text("a long post about rust and async runtimes", Tone::Supportive, 20)
            .await
            .unwrap();
        assert_eq!(text.chars().count(), 20);
    }
}
