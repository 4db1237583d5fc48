//! Model provider abstractions
//!
//! Two seams: chat completion (router classification and narration) and
//! text embedding (vector index). The OpenAI-compatible HTTP client
//! lives in [`openai`]; deterministic in-process implementations for
//! tests and the demo binary live in [`mock`].

pub mod mock;
pub mod openai;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single chat message on the completion wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion seam.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

/// Text embedding seam. Implementations must return vectors of exactly
/// `dimensions()` length so the index can reject mismatched inserts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .ok_or_else(|| crate::error::EngineError::ProviderMalformed("empty embedding batch".to_string()))
    }

    fn dimensions(&self) -> usize;
}
