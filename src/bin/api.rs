//! API server binary
//!
//! Serves the query engine over HTTP. Uses the OpenAI-compatible
//! provider when OPENAI_API_KEY is configured and falls back to the
//! deterministic in-process providers otherwise, so the server always
//! starts.

use std::sync::Arc;
use tracing::{info, warn};
use transaction_query_engine::api::start_server;
use transaction_query_engine::provider::mock::{
    HashEmbeddingProvider, ScriptedCompletionProvider,
};
use transaction_query_engine::provider::openai::OpenAiProvider;
use transaction_query_engine::provider::{CompletionProvider, EmbeddingProvider};
use transaction_query_engine::store::demo_records;
use transaction_query_engine::{EngineConfig, InMemoryTransactionStore, QueryEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let config = EngineConfig::from_env();

    let (completion, embedder): (Arc<dyn CompletionProvider>, Arc<dyn EmbeddingProvider>) =
        if config.api_key.is_some() {
            let provider = Arc::new(OpenAiProvider::new(&config)?);
            (provider.clone(), provider)
        } else {
            warn!("OPENAI_API_KEY not set, using deterministic in-process providers");
            (
                Arc::new(ScriptedCompletionProvider::new(
                    r#"{"tool": "none", "args": {}}"#,
                )),
                Arc::new(HashEmbeddingProvider::default()),
            )
        };

    let store = Arc::new(InMemoryTransactionStore::new(demo_records()));
    let engine = Arc::new(QueryEngine::new(config, store, completion, embedder));

    info!("warming up vector index");
    engine.warm_up().await?;

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    start_server(engine, port).await
}
