//! Engine configuration
//!
//! Read once at startup from environment variables (binaries load .env
//! first via dotenv). Every knob has a working default so the engine
//! runs offline with mock providers.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How searches behave when the index fingerprint lags the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessMode {
    /// Block the query until the rebuild for the current fingerprint
    /// completes
    Strict,
    /// Serve the last valid index while a background rebuild runs
    /// (default; avoids query-latency spikes)
    Eventual,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chat model used by the router fallback and the narrator
    pub completion_model: String,
    /// Embedding model used for indexing and querying alike
    pub embedding_model: String,
    pub max_output_tokens: u32,
    /// Narration temperature; near-zero so figures are restated, not
    /// paraphrased
    pub temperature: f32,
    /// Top-k for semantic retrieval
    pub top_k: usize,
    pub freshness_mode: FreshnessMode,
    /// Directory for fingerprint-keyed index persistence, `None`
    /// disables persistence entirely
    pub index_dir: Option<PathBuf>,
    /// Upper bound on any single provider call
    pub provider_timeout: Duration,
    /// Maximum accepted question length in characters
    pub max_question_chars: usize,
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_output_tokens: 1000,
            temperature: 0.0,
            top_k: 15,
            freshness_mode: FreshnessMode::Eventual,
            index_dir: Some(PathBuf::from("data/index")),
            provider_timeout: Duration::from_secs(30),
            max_question_chars: 2000,
            api_key: None,
        }
    }
}

impl EngineConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or(defaults.completion_model),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            max_output_tokens: parse_env("MAX_OUTPUT_TOKENS", defaults.max_output_tokens),
            temperature: parse_env("NARRATION_TEMPERATURE", defaults.temperature),
            top_k: parse_env("RETRIEVAL_TOP_K", defaults.top_k),
            freshness_mode: match env::var("INDEX_FRESHNESS").as_deref() {
                Ok("strict") => FreshnessMode::Strict,
                _ => FreshnessMode::Eventual,
            },
            index_dir: env::var("INDEX_DIR")
                .map(|dir| Some(PathBuf::from(dir)))
                .unwrap_or(defaults.index_dir),
            provider_timeout: Duration::from_secs(parse_env(
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )),
            max_question_chars: parse_env("MAX_QUESTION_CHARS", defaults.max_question_chars),
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.top_k, 15);
        assert_eq!(config.freshness_mode, FreshnessMode::Eventual);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_question_chars, 2000);
    }

    #[test]
    fn test_parse_env_falls_back() {
        std::env::remove_var("DOES_NOT_EXIST_42");
        assert_eq!(parse_env::<usize>("DOES_NOT_EXIST_42", 7), 7);
    }
}
