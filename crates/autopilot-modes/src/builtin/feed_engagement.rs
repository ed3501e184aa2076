//! Feed engagement: browse the feed, like and comment on relevant posts.

use async_trait::async_trait;
use autopilot_core::types::Metrics;
use serde::{Deserialize, Serialize};

use crate::collaborator::{Collaborators, RemoteAction, RemoteItem, Surface, Tone};
use crate::error::ModeError;
use crate::keywords::KeywordFilter;
use crate::mode::{ModeContext, ModeLogic};

/// Posts read per fetch.
pub const FEED_BATCH_SIZE: usize = 5;

const COMMENT_MIN_CHARS: usize = 50;
const COMMENT_MAX_LENGTH: usize = 200;

/// Settings under `[modes.feed_engagement]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedEngagementSettings {
    pub max_likes_per_session: u32,
    pub max_comments_per_session: u32,
    /// Consecutive irrelevant posts after which the next one is engaged anyway.
    pub max_skips_before_engage: u32,
    /// Fetch budget per run.
    pub max_batches: u32,
    pub target_keywords: Vec<String>,
    pub avoid_keywords: Vec<String>,
}

impl Default for FeedEngagementSettings {
    fn default() -> Self {
        Self {
            max_likes_per_session: 10,
            max_comments_per_session: 3,
            max_skips_before_engage: 8,
            max_batches: 6,
            target_keywords: Vec::new(),
            avoid_keywords: Vec::new(),
        }
    }
}

pub struct FeedEngagement {
    settings: FeedEngagementSettings,
    filter: KeywordFilter,
    collaborators: Collaborators,
}

#[derive(Default)]
struct SessionCounters {
    posts_processed: u32,
    likes: u32,
    comments: u32,
    consecutive_skips: u32,
}

impl FeedEngagement {
    pub fn new(
        settings: FeedEngagementSettings,
        collaborators: Collaborators,
    ) -> Result<Self, ModeError> {
        let filter = KeywordFilter::new(&settings.target_keywords, &settings.avoid_keywords)?;
        Ok(Self {
            settings,
            filter,
            collaborators,
        })
    }

    fn limits_reached(&self, counters: &SessionCounters) -> bool {
        counters.likes >= self.settings.max_likes_per_session
            && counters.comments >= self.settings.max_comments_per_session
    }

    /// Relevance check with the skip escape hatch.
    fn should_engage(&self, post: &RemoteItem, counters: &mut SessionCounters) -> bool {
        if self.filter.matches(&post.text) {
            counters.consecutive_skips = 0;
            return true;
        }
        counters.consecutive_skips += 1;
        if counters.consecutive_skips >= self.settings.max_skips_before_engage {
            tracing::debug!(post = %post.id, skips = counters.consecutive_skips, "Engaging after consecutive skips");
            counters.consecutive_skips = 0;
            return true;
        }
        false
    }

    async fn like(&self, post: &RemoteItem) -> Result<bool, ModeError> {
        let store = &self.collaborators.store;
        if store
            .has_action("feed_like", &post.id)
            .await
            .map_err(ModeError::Store)?
        {
            return Ok(false);
        }
        self.collaborators
            .actuator
            .perform(&RemoteAction::like(&post.id))
            .await
            .map_err(ModeError::Actuator)?;
        store
            .record_action("feed_like", &post.id)
            .await
            .map_err(ModeError::Store)?;
        Ok(true)
    }

    async fn comment(&self, post: &RemoteItem) -> Result<(), ModeError> {
        let text = self
            .collaborators
            .generator
            .generate_text(&post.text, Tone::Supportive, COMMENT_MAX_LENGTH)
            .await
            .map_err(ModeError::Generator)?;
        self.collaborators
            .actuator
            .perform(&RemoteAction::comment(&post.id, text))
            .await
            .map_err(ModeError::Actuator)
    }

    async fn engage(&self, ctx: &ModeContext<'_>, post: &RemoteItem, counters: &mut SessionCounters) {
        if counters.likes < self.settings.max_likes_per_session {
            match self.like(post).await {
                Ok(true) => {
                    counters.likes += 1;
                    ctx.record_action("feed_like");
                }
                Ok(false) => tracing::debug!(post = %post.id, "Post already liked"),
                Err(e) => tracing::warn!(post = %post.id, error = %e, "Failed to like post"),
            }
        }

        if counters.comments < self.settings.max_comments_per_session
            && post.text.chars().count() > COMMENT_MIN_CHARS
            && ctx.check_safety_limits("feed_comment")
        {
            match self.comment(post).await {
                Ok(()) => {
                    counters.comments += 1;
                    ctx.record_action("feed_comment");
                }
                Err(e) => tracing::warn!(post = %post.id, error = %e, "Failed to comment on post"),
            }
        }
    }
}

#[async_trait]
impl ModeLogic for FeedEngagement {
    fn validate_config(&self) -> Result<(), ModeError> {
        if self.settings.max_batches == 0 {
            return Err(ModeError::InvalidConfig(
                "max_batches must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ModeContext<'_>) -> Result<Metrics, ModeError> {
        let mut counters = SessionCounters::default();

        'batches: for _ in 0..self.settings.max_batches {
            let posts = self
                .collaborators
                .actuator
                .fetch(Surface::Feed, FEED_BATCH_SIZE)
                .await
                .map_err(ModeError::Actuator)?;
            if posts.is_empty() {
                tracing::debug!(mode = %ctx.mode_name(), "Feed exhausted");
                break;
            }

            for post in &posts {
                if self.limits_reached(&counters) {
                    tracing::info!(mode = %ctx.mode_name(), "Engagement limits reached");
                    break 'batches;
                }
                counters.posts_processed += 1;
                if !self.should_engage(post, &mut counters) {
                    continue;
                }
                self.engage(ctx, post, &mut counters).await;
                ctx.human_delay().await;
            }
        }

        let mut metrics = Metrics::new();
        metrics.insert("posts_processed".to_string(), counters.posts_processed.into());
        metrics.insert("likes".to_string(), counters.likes.into());
        metrics.insert("comments".to_string(), counters.comments.into());
        Ok(metrics)
    }
}
