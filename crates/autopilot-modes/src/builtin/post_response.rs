//! Post response: reply to new comments on the operator's own posts.

use std::collections::HashSet;

use async_trait::async_trait;
use autopilot_core::types::Metrics;
use serde::{Deserialize, Serialize};

use crate::collaborator::{Collaborators, RemoteAction, RemoteItem, Surface, Tone};
use crate::error::ModeError;
use crate::mode::{ModeContext, ModeLogic};

/// Ledger action type for replies, also the recorded action class.
pub const POST_REPLY: &str = "post_reply";

const COMMENT_FETCH_LIMIT: usize = 50;
const MIN_COMMENT_CHARS: usize = 5;
const REPLY_MAX_LENGTH: usize = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostResponseSettings {
    pub check_interval_minutes: u32,
    /// When false, comments are counted but never answered.
    pub auto_reply: bool,
    pub max_replies_per_check: u32,
}

impl Default for PostResponseSettings {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
            auto_reply: true,
            max_replies_per_check: 5,
        }
    }
}

pub struct PostResponse {
    settings: PostResponseSettings,
    collaborators: Collaborators,
}

impl PostResponse {
    pub fn new(settings: PostResponseSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    async fn should_reply(&self, comment: &RemoteItem) -> Result<bool, ModeError> {
        if comment.text.trim().chars().count() < MIN_COMMENT_CHARS {
            return Ok(false);
        }
        let answered = self
            .collaborators
            .store
            .has_action(POST_REPLY, &comment.id)
            .await
            .map_err(ModeError::Store)?;
        if answered {
            tracing::debug!(comment = %comment.id, "Already replied to comment");
        }
        Ok(!answered)
    }

    async fn reply(&self, comment: &RemoteItem) -> Result<(), ModeError> {
        let text = self
            .collaborators
            .generator
            .generate_text(&comment.text, Tone::Friendly, REPLY_MAX_LENGTH)
            .await
            .map_err(ModeError::Generator)?;
        self.collaborators
            .actuator
            .perform(&RemoteAction::reply(&comment.id, text))
            .await
            .map_err(ModeError::Actuator)?;
        self.collaborators
            .store
            .record_action(POST_REPLY, &comment.id)
            .await
            .map_err(ModeError::Store)
    }
}

#[async_trait]
impl ModeLogic for PostResponse {
    fn validate_config(&self) -> Result<(), ModeError> {
        if self.settings.check_interval_minutes == 0 {
            return Err(ModeError::InvalidConfig(
                "check_interval_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
        let comments = self
            .collaborators
            .actuator
            .fetch(Surface::OwnPostComments, COMMENT_FETCH_LIMIT)
            .await
            .map_err(ModeError::Actuator)?;

        let posts_checked = comments
            .iter()
            .filter_map(|c| c.parent_id.as_deref())
            .collect::<HashSet<_>>()
            .len();
        let mut replies_sent = 0u32;

        for comment in &comments {
            if replies_sent >= self.settings.max_replies_per_check {
                tracing::info!(mode = %ctx.mode_name(), limit = self.settings.max_replies_per_check, "Reply limit reached");
                break;
            }
            match self.should_reply(comment).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(comment = %comment.id, error = %e, "Could not check reply history");
                    continue;
                }
            }
            if !self.settings.auto_reply {
                continue;
            }
            match self.reply(comment).await {
                Ok(()) => {
                    replies_sent += 1;
                    ctx.record_action(POST_REPLY);
                }
                Err(e) => tracing::warn!(comment = %comment.id, error = %e, "Failed to reply to comment"),
            }
            ctx.human_delay().await;
        }

        let mut metrics = Metrics::new();
        metrics.insert("posts_checked".to_string(), posts_checked.into());
        metrics.insert("comments_found".to_string(), comments.len().into());
        metrics.insert("replies_sent".to_string(), replies_sent.into());
        Ok(metrics)
    }
}
