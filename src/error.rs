//! Error types for the transaction query engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {

    // =============================
    // Recoverable Query Errors
    // =============================

    #[error("Invalid tool argument: {0}")]
    InvalidArgument(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Provider call timed out after {0} ms")]
    ProviderTimeout(u64),

    #[error("Provider rate limited: {0}")]
    ProviderRateLimited(String),

    #[error("Provider returned a malformed response: {0}")]
    ProviderMalformed(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    // =============================
    // Fatal Errors
    // =============================

    #[error("Transaction store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the orchestrator may continue toward a degraded answer.
    /// Only a missing transaction store (or broken config) aborts a query.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::ConfigError(_)
        )
    }

    /// Whether a single bounded retry against the provider is worthwhile.
    pub fn is_transient_provider(&self) -> bool {
        matches!(
            self,
            EngineError::ProviderTimeout(_) | EngineError::ProviderRateLimited(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_split() {
        assert!(EngineError::InvalidArgument("n".into()).is_recoverable());
        assert!(EngineError::IndexUnavailable("cold".into()).is_recoverable());
        assert!(EngineError::ProviderTimeout(30_000).is_recoverable());
        assert!(!EngineError::StoreUnavailable("gone".into()).is_recoverable());
    }

    #[test]
    fn test_transient_provider_errors() {
        assert!(EngineError::ProviderTimeout(100).is_transient_provider());
        assert!(EngineError::ProviderRateLimited("429".into()).is_transient_provider());
        assert!(!EngineError::ProviderMalformed("bad json".into()).is_transient_provider());
    }
}
