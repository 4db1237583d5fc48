//! Demo binary
//!
//! Runs a scripted conversation against the built-in dataset with
//! deterministic in-process providers, so it works offline and prints
//! the same answers every run.

use std::sync::Arc;
use tracing::info;
use transaction_query_engine::provider::mock::{
    FailingCompletionProvider, HashEmbeddingProvider,
};
use transaction_query_engine::store::demo_records;
use transaction_query_engine::{
    EngineConfig, FreshnessMode, InMemoryTransactionStore, QueryEngine, SessionHistory,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Transaction query engine demo starting");

    let config = EngineConfig {
        freshness_mode: FreshnessMode::Strict,
        index_dir: None,
        ..EngineConfig::default()
    };

    // no completion model offline: free-text questions degrade to
    // retrieval and all answers come from the figure templates
    let completion = Arc::new(FailingCompletionProvider { timeout_ms: 0 });
    let embedder = Arc::new(HashEmbeddingProvider::default());
    let store = Arc::new(InMemoryTransactionStore::new(demo_records()));

    let engine = QueryEngine::new(config, store, completion, embedder);
    engine.warm_up().await?;

    let questions = [
        "What was my most recent transaction?",
        "How much did I spend at Prisma?",
        "Top 3 biggest purchases",
        "Which subscriptions am I paying for?",
        "anything interesting about streaming?",
    ];

    let mut history = SessionHistory::new();
    for question in questions {
        let outcome = engine.ask(question, &mut history).await?;
        println!("Q: {}", question);
        println!(
            "A: {}  [intent={}, {}ms{}]",
            outcome.answer,
            outcome.intent_used.label(),
            outcome.latency_ms,
            if outcome.degraded { ", degraded" } else { "" },
        );
        println!();
    }

    Ok(())
}
