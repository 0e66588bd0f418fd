use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn headlines(&self, api_key: &str, topic: &str, limit: usize) -> Result<Vec<Headline>>;
}

/// NewsAPI `everything` search
#[derive(Debug)]
pub struct NewsApiClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

impl NewsApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("influencer-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl NewsFeed for NewsApiClient {
    async fn headlines(&self, api_key: &str, topic: &str, limit: usize) -> Result<Vec<Headline>> {
        let page_size = limit.clamp(1, 100).to_string();
        let response = self
            .client
            .get(format!("{}/everything", self.base_url))
            .header("X-Api-Key", api_key)
            .query(&[
                ("q", topic),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to news API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("News API request failed with status {}: {}", status, error_text);
        }

        let parsed: NewsApiResponse = response
            .json()
            .await
            .context("Failed to parse news API response")?;

        Ok(into_headlines(parsed, limit))
    }
}

fn into_headlines(response: NewsApiResponse, limit: usize) -> Vec<Headline> {
    response
        .articles
        .into_iter()
        .filter_map(|article| {
            let title = article.title.filter(|t| !t.trim().is_empty() && t != "[Removed]")?;
            Some(Headline {
                title,
                source: article.source.and_then(|s| s.name),
                url: article.url,
                published_at: article.published_at,
            })
        })
        .take(limit)
        .collect()
}
