//! Fakes shared by unit tests

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::activities::Services;
use crate::activity::ActivityContext;
use crate::credentials::ResolvedCredentials;
use crate::db::{InMemoryStore, KeyValueStore};
use crate::github::{CommitSource, CommitSummary};
use crate::llm::{ChatModel, ChatRequest, GeneratedImage, ImageModel};
use crate::memory::{MemoryStore, MEMORY_CAPACITY};
use crate::news::{Headline, NewsFeed};
use crate::persistence::{PersistPolicy, Persister};
use crate::social::{PublishedPost, SocialPoster};
use crate::state::AgentState;
use crate::web::{FetchedPage, PageFetcher};

/// Replays canned replies in order and records every request
pub struct MockChatModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.prompt).collect()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, _api_key: &str, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("No mock responses available"))
    }
}

#[derive(Default)]
pub struct MockImageModel {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockImageModel {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageModel for MockImageModel {
    async fn generate(&self, _api_key: &str, prompt: &str) -> Result<GeneratedImage> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        if self.fail {
            anyhow::bail!("image backend unavailable");
        }
        Ok(GeneratedImage {
            url: format!("https://images.test/{}.png", prompts.len()),
            revised_prompt: None,
        })
    }
}

/// Records (text, media_url) of every post
#[derive(Default)]
pub struct RecordingPoster {
    posts: Mutex<Vec<(String, Option<String>)>>,
    fail: bool,
}

impl RecordingPoster {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn posts(&self) -> Vec<(String, Option<String>)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocialPoster for RecordingPoster {
    async fn post(&self, _token: &str, text: &str, media_url: Option<&str>) -> Result<PublishedPost> {
        if self.fail {
            anyhow::bail!("403 Forbidden");
        }
        let mut posts = self.posts.lock().unwrap();
        posts.push((text.to_string(), media_url.map(str::to_string)));
        Ok(PublishedPost {
            id: format!("post-{}", posts.len()),
            text: text.to_string(),
            media_url: media_url.map(str::to_string),
            dry_run: false,
        })
    }
}

/// Serves the same body for any URL
pub struct StaticFetcher {
    body: String,
    urls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(FetchedPage {
            url: url.to_string(),
            status: 200,
            body: self.body.clone(),
        })
    }
}

pub struct StaticNews {
    titles: Vec<String>,
    topics: Mutex<Vec<String>>,
}

impl StaticNews {
    pub fn new(titles: &[&str]) -> Self {
        Self {
            titles: titles.iter().map(|t| t.to_string()).collect(),
            topics: Mutex::new(Vec::new()),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsFeed for StaticNews {
    async fn headlines(&self, _api_key: &str, topic: &str, limit: usize) -> Result<Vec<Headline>> {
        self.topics.lock().unwrap().push(topic.to_string());
        Ok(self
            .titles
            .iter()
            .take(limit)
            .map(|title| Headline {
                title: title.clone(),
                source: Some("Test Wire".to_string()),
                url: None,
                published_at: None,
            })
            .collect())
    }
}

pub struct StaticCommits {
    messages: Vec<String>,
}

impl StaticCommits {
    pub fn new(messages: &[&str]) -> Self {
        Self {
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CommitSource for StaticCommits {
    async fn recent_commits(
        &self,
        _token: &str,
        _repo: &str,
        _since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>> {
        Ok(self
            .messages
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, message)| CommitSummary {
                sha: format!("abc{:04}", i),
                message: message.clone(),
                author: Some("agent".to_string()),
                date: None,
            })
            .collect())
    }
}

/// Fails the first `n` writes, then behaves like [`InMemoryStore`]
pub struct FailingStore {
    inner: InMemoryStore,
    failures_left: Mutex<usize>,
    attempts: Mutex<usize>,
}

impl FailingStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures_left: Mutex::new(failures),
            attempts: Mutex::new(0),
        }
    }

    /// Write attempts so far, failed ones included
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            anyhow::bail!("disk full");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

pub fn persister() -> Arc<Persister> {
    Arc::new(Persister::new(Arc::new(InMemoryStore::new()), PersistPolicy::Drop))
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(persister(), MEMORY_CAPACITY))
}

/// Context built from the default state with each of `keys` resolved
pub fn context_with_keys(keys: &[&str]) -> ActivityContext {
    let credentials = keys
        .iter()
        .fold(ResolvedCredentials::default(), |creds, key| creds.with(key, "test-key"));
    ActivityContext::from_state(&AgentState::default(), credentials)
}

pub fn fixture_services() -> Services {
    Services {
        chat_model: Arc::new(MockChatModel::new(Vec::<String>::new())),
        image_model: Arc::new(MockImageModel::default()),
        poster: Arc::new(RecordingPoster::default()),
        fetcher: Arc::new(StaticFetcher::new("<html></html>")),
        news: Arc::new(StaticNews::new(&[])),
        commits: Arc::new(StaticCommits::new(&[])),
    }
}
