use crate::config::LlmConfig;
use crate::error::CompletionError;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};
use std::time::Duration;

/// A text-in, text-out language model endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;
        debug!("Sending completion request ({} prompt chars)", prompt.len());

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", api_key)])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let payload: Value = response.json().await?;
        candidate_text(&payload)
            .map(str::to_string)
            .ok_or(CompletionError::EmptyResponse)
    }
}

fn candidate_text(payload: &Value) -> Option<&str> {
    payload["candidates"][0]["content"]["parts"][0]["text"].as_str()
}

/// Wraps another client with bounded attempts and exponential backoff.
pub struct RetryingClient<C> {
    inner: C,
    max_attempts: u32,
    backoff: Duration,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Completion attempt {}/{} failed: {}. Retrying in {:?}.",
                        attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
