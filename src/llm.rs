use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single chat-completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.8,
            max_tokens: 500,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Chat-completion backend. The API key is supplied per call because it is
/// resolved from the credential store at execution time.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<GeneratedImage>;
}

/// OpenAI-compatible client for chat completions and image generation
#[derive(Debug)]
pub struct OpenAiClient {
    base_url: String,
    chat_model: String,
    image_model: String,
    image_size: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Debug, Deserialize)]
struct CompletionContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<GeneratedImage>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        chat_model: &str,
        image_model: &str,
        image_size: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            image_model: image_model.to_string(),
            image_size: image_size.to_string(),
            client,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        api_key: &str,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "OpenAI request to {} failed with status {}: {}",
                path,
                status,
                error_text
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(CompletionMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(CompletionMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = CompletionRequest {
            model: &self.chat_model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let completion: CompletionResponse = self
            .post_json(api_key, "/chat/completions", &body)
            .await?
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("No content in chat completion response"))
    }
}

#[async_trait]
impl ImageModel for OpenAiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<GeneratedImage> {
        let body = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: &self.image_size,
        };

        let images: ImageResponse = self
            .post_json(api_key, "/images/generations", &body)
            .await?
            .json()
            .await
            .context("Failed to parse image generation response")?;

        images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No image in generation response"))
    }
}
