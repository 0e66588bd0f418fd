use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    pub date: Option<String>,
}

#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Commits on the default branch of `repo` ("owner/name") since `since`
    async fn recent_commits(
        &self,
        token: &str,
        repo: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>>;
}

#[derive(Debug)]
pub struct GitHubClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    #[serde(default)]
    author: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl GitHubClient {
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
impl CommitSource for GitHubClient {
    async fn recent_commits(
        &self,
        token: &str,
        repo: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>> {
        if !is_repo_slug(repo) {
            anyhow::bail!("Invalid repository `{}`, expected owner/name", repo);
        }

        let per_page = limit.clamp(1, 100).to_string();
        let since = since.to_rfc3339();
        let response = self
            .client
            .get(format!("{}/repos/{}/commits", self.base_url, repo))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .query(&[("since", since.as_str()), ("per_page", per_page.as_str())])
            .send()
            .await
            .context("Failed to send request to GitHub API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API request failed with status {}: {}", status, error_text);
        }

        let commits: Vec<ApiCommit> = response
            .json()
            .await
            .context("Failed to parse GitHub API response")?;

        Ok(commits.into_iter().take(limit).map(summarize).collect())
    }
}

fn summarize(commit: ApiCommit) -> CommitSummary {
    let (author, date) = match commit.commit.author {
        Some(sig) => (sig.name, sig.date),
        None => (None, None),
    };
    CommitSummary {
        sha: commit.sha.chars().take(7).collect(),
        message: commit.commit.message.lines().next().unwrap_or_default().to_string(),
        author,
        date,
    }
}

fn is_repo_slug(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}
