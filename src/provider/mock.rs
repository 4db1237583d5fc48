//! Deterministic in-process providers
//!
//! Used by unit tests and by the demo binary when no API key is
//! configured. Both are fully deterministic so that routing, retrieval,
//! and narration behave identically run to run.

use crate::error::EngineError;
use crate::provider::{ChatMessage, CompletionProvider, EmbeddingProvider};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Completion provider that replays scripted responses, then falls back
/// to a fixed default. Push an `Err` to simulate provider failures.
pub struct ScriptedCompletionProvider {
    responses: Mutex<VecDeque<Result<String>>>,
    default: String,
}

impl ScriptedCompletionProvider {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default: default.into(),
        }
    }

    pub fn push(&self, response: Result<String>) {
        let mut queue = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queue.push_back(response);
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        let next = {
            let mut queue = self
                .responses
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.pop_front()
        };
        match next {
            Some(response) => response,
            None => Ok(self.default.clone()),
        }
    }
}

/// Completion provider that always fails, for exercising fallback paths.
pub struct FailingCompletionProvider {
    pub timeout_ms: u64,
}

#[async_trait]
impl CompletionProvider for FailingCompletionProvider {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        Err(EngineError::ProviderTimeout(self.timeout_ms))
    }
}

/// Embedding provider that hashes character trigrams into a fixed-size
/// vector. Similar strings land near each other, which is enough for
/// retrieval tests without any network dependency.
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        for window in chars.windows(3) {
            let bucket = (fnv1a(window) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Stable FNV-1a over the code points of a trigram.
fn fnv1a(window: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for c in window {
        for byte in (*c as u32).to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}
