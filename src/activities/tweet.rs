//! Posting activities. All three share one daily tweet counter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names, ChatActivity, DrawActivity};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult, DailyLimiter};
use crate::memory::{MemoryEntry, MemoryStore};
use crate::social::{fit_post, PublishedPost, SocialPoster, MAX_POST_CHARS};

const RECENT_MEMORIES: usize = 5;

fn compose_prompt(ctx: &ActivityContext, topic: Option<&str>) -> String {
    let topic = topic
        .map(str::to_string)
        .or_else(|| ctx.strongest_domain().map(|d| d.replace('_', " ")))
        .unwrap_or_else(|| "whatever is on your mind".to_string());
    format!(
        "Write one tweet about {}. At most {} characters, no hashtags spam, no quotes around it.",
        topic, MAX_POST_CHARS
    )
}

async fn publish(
    poster: &dyn SocialPoster,
    limiter: &DailyLimiter,
    ctx: &ActivityContext,
    text: &str,
    media_url: Option<&str>,
) -> Result<PublishedPost> {
    let token = ctx
        .credentials
        .get(keys::TWITTER)
        .ok_or_else(|| anyhow::anyhow!("missing API key `{}`", keys::TWITTER))?;

    let post = poster
        .post(token, text, media_url)
        .await
        .context("Failed to publish post")?;
    limiter.record();
    Ok(post)
}

pub struct PostTweetActivity {
    chat: Arc<ChatActivity>,
    poster: Arc<dyn SocialPoster>,
    limiter: Arc<DailyLimiter>,
}

impl PostTweetActivity {
    pub fn new(chat: Arc<ChatActivity>, poster: Arc<dyn SocialPoster>, limiter: Arc<DailyLimiter>) -> Self {
        Self { chat, poster, limiter }
    }
}

#[async_trait]
impl Activity for PostTweetActivity {
    fn name(&self) -> &str {
        names::POST_TWEET
    }

    fn description(&self) -> &str {
        "Compose a tweet in the agent's voice and post it"
    }

    fn energy_cost(&self) -> f64 {
        0.15
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI, keys::TWITTER]
    }

    fn success_mood(&self) -> &str {
        "excited"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let outcome = async {
            self.limiter.check()?;
            let text = match param_str(params, "text") {
                Some(text) => text.to_string(),
                None => {
                    let prompt = compose_prompt(ctx, param_str(params, "topic"));
                    self.chat.generate(ctx, &prompt).await?
                }
            };
            let post = publish(self.poster.as_ref(), &self.limiter, ctx, &fit_post(&text), None).await?;
            anyhow::Ok(json!({ "post": post, "remaining_today": self.limiter.remaining() }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

/// Tweets a summary of the agent's latest successful activities
pub struct PostRecentMemoriesTweetActivity {
    chat: Arc<ChatActivity>,
    poster: Arc<dyn SocialPoster>,
    limiter: Arc<DailyLimiter>,
    memory: Arc<MemoryStore>,
}

impl PostRecentMemoriesTweetActivity {
    pub fn new(
        chat: Arc<ChatActivity>,
        poster: Arc<dyn SocialPoster>,
        limiter: Arc<DailyLimiter>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self { chat, poster, limiter, memory }
    }

    fn shareable_memories(&self) -> Vec<MemoryEntry> {
        self.memory
            .recent(50, 0)
            .into_iter()
            .filter(|entry| entry.success && !is_posting_activity(&entry.activity_type))
            .take(RECENT_MEMORIES)
            .collect()
    }
}

fn is_posting_activity(activity: &str) -> bool {
    [names::POST_TWEET, names::POST_RECENT_MEMORIES_TWEET, names::POST_TWEET_WITH_IMAGE]
        .contains(&activity)
}

fn describe_memory(entry: &MemoryEntry) -> String {
    let detail = entry
        .data
        .as_ref()
        .map(|data| {
            let raw = data.to_string();
            raw.chars().take(160).collect::<String>()
        })
        .unwrap_or_default();
    format!("- {}: {}", entry.activity_type, detail)
}

#[async_trait]
impl Activity for PostRecentMemoriesTweetActivity {
    fn name(&self) -> &str {
        names::POST_RECENT_MEMORIES_TWEET
    }

    fn description(&self) -> &str {
        "Tweet about what the agent has been doing lately"
    }

    fn energy_cost(&self) -> f64 {
        0.15
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(6 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI, keys::TWITTER]
    }

    fn success_mood(&self) -> &str {
        "sociable"
    }

    async fn execute(&self, ctx: &ActivityContext, _params: &Value) -> ActivityResult {
        let memories = self.shareable_memories();
        if memories.is_empty() {
            return ActivityResult::failure("no recent successful activities to share");
        }

        let outcome = async {
            self.limiter.check()?;
            let summary = memories.iter().map(describe_memory).collect::<Vec<_>>().join("\n");
            let prompt = format!(
                "Here is what you did recently:\n{}\n\nWrite one tweet (max {} characters) sharing the highlight with your followers.",
                summary, MAX_POST_CHARS
            );
            let text = self.chat.generate(ctx, &prompt).await?;
            let post = publish(self.poster.as_ref(), &self.limiter, ctx, &fit_post(&text), None).await?;
            anyhow::Ok(json!({ "post": post, "memories_used": memories.len() }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

/// Tweet plus a freshly generated image
pub struct PostTweetWithImageActivity {
    chat: Arc<ChatActivity>,
    draw: Arc<DrawActivity>,
    poster: Arc<dyn SocialPoster>,
    limiter: Arc<DailyLimiter>,
}

impl PostTweetWithImageActivity {
    pub fn new(
        chat: Arc<ChatActivity>,
        draw: Arc<DrawActivity>,
        poster: Arc<dyn SocialPoster>,
        limiter: Arc<DailyLimiter>,
    ) -> Self {
        Self { chat, draw, poster, limiter }
    }
}

#[async_trait]
impl Activity for PostTweetWithImageActivity {
    fn name(&self) -> &str {
        names::POST_TWEET_WITH_IMAGE
    }

    fn description(&self) -> &str {
        "Compose a tweet, illustrate it and post both"
    }

    fn energy_cost(&self) -> f64 {
        0.3
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(6 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI, keys::TWITTER]
    }

    fn success_mood(&self) -> &str {
        "proud"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let outcome = async {
            self.limiter.check()?;
            let text = match param_str(params, "text") {
                Some(text) => text.to_string(),
                None => {
                    let prompt = compose_prompt(ctx, param_str(params, "topic"));
                    self.chat.generate(ctx, &prompt).await?
                }
            };
            let text = fit_post(&text);

            let image_prompt = param_str(params, "image_prompt")
                .map(str::to_string)
                .unwrap_or_else(|| format!("An eye-catching illustration for this post: {}", text));
            let image = self.draw.create(ctx, &image_prompt).await?;

            let post = publish(self.poster.as_ref(), &self.limiter, ctx, &text, Some(&image.url)).await?;
            anyhow::Ok(json!({ "post": post, "image_prompt": image_prompt }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}
