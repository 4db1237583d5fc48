//! OpenAI-compatible HTTP provider
//!
//! One pooled `reqwest::Client` serves both the chat completions and
//! embeddings endpoints. Transport timeouts and 429 responses map onto
//! the transient error variants so callers can retry or fall back.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::provider::{ChatMessage, CompletionProvider, EmbeddingProvider};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Known output width of text-embedding-3-small.
const EMBEDDING_DIMENSIONS: usize = 1536;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    completion_model: String,
    embedding_model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EngineError::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            completion_model: config.completion_model.clone(),
            embedding_model: config.embedding_model.clone(),
            timeout: config.provider_timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::ProviderTimeout(self.timeout.as_millis() as u64)
                } else {
                    EngineError::HttpError(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            warn!(%url, "provider rate limited");
            return Err(EngineError::ProviderRateLimited(detail));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::ProviderMalformed(format!(
                "{} returned {}: {}",
                path, status, detail
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| EngineError::ProviderMalformed(e.to_string()))
    }
}

// =============================
// Wire types
// =============================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        debug!(model = %self.completion_model, message_count = messages.len(), "chat completion request");

        let request = CompletionRequest {
            model: &self.completion_model,
            messages,
            temperature,
            max_tokens,
        };
        let response: CompletionResponse = self.post_json("/chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| EngineError::ProviderMalformed("completion had no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.embedding_model, batch = texts.len(), "embedding request");

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post_json("/embeddings", &request).await?;

        if response.data.len() != texts.len() {
            return Err(EngineError::ProviderMalformed(format!(
                "embedding batch size mismatch: sent {}, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // the API may reorder entries, restore input order by index
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}
