use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub const MAX_POST_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub media_url: Option<String>,
    /// True when the post was only logged, not sent
    #[serde(default)]
    pub dry_run: bool,
}

#[async_trait]
pub trait SocialPoster: Send + Sync {
    async fn post(&self, token: &str, text: &str, media_url: Option<&str>) -> Result<PublishedPost>;
}

/// Twitter/X v2 client
#[derive(Debug)]
pub struct TwitterClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    text: String,
}

impl TwitterClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SocialPoster for TwitterClient {
    async fn post(&self, token: &str, text: &str, media_url: Option<&str>) -> Result<PublishedPost> {
        // The v2 endpoint takes media ids, not URLs; link the image instead.
        let body = match media_url {
            Some(url) => format!("{}\n{}", text, url),
            None => text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(token)
            .json(&TweetRequest { text: &body })
            .send()
            .await
            .context("Failed to send request to Twitter API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Twitter API request failed with status {}: {}",
                status,
                error_text
            );
        }

        let tweet: TweetResponse = response
            .json()
            .await
            .context("Failed to parse Twitter API response")?;

        Ok(PublishedPost {
            id: tweet.data.id,
            text: tweet.data.text,
            media_url: media_url.map(str::to_string),
            dry_run: false,
        })
    }
}

/// Logs the post instead of sending it
#[derive(Debug, Default)]
pub struct DryRunPoster;

#[async_trait]
impl SocialPoster for DryRunPoster {
    async fn post(&self, _token: &str, text: &str, media_url: Option<&str>) -> Result<PublishedPost> {
        info!("dry-run post: {}", text);
        Ok(PublishedPost {
            id: format!("dry-run-{}", chrono::Utc::now().timestamp_millis()),
            text: text.to_string(),
            media_url: media_url.map(str::to_string),
            dry_run: true,
        })
    }
}

/// Clamp to the platform limit on a char boundary, marking the cut
pub fn fit_post(text: &str) -> String {
    let text = text.trim().trim_matches('"').trim();
    if text.chars().count() <= MAX_POST_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_POST_CHARS - 1).collect();
    clipped.push('…');
    clipped
}
