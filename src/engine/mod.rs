//! Query orchestration
//!
//! `QueryEngine::ask` drives one question through the lifecycle:
//! Received, Routed, then one of Executing / Retrieving / Rejected,
//! then Narrating and Completed (the rejected path skips Narrating).
//! Only a snapshot failure reaches Failed; every other fault degrades
//! to a poorer but still correct answer, and a tool call with bad
//! arguments completes the turn with a request for clarification.
//! History is appended only on completion.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    AskOutcome, QueryIntent, QueryState, RetrievalResult, RetrievedRecord, TransactionRecord,
    UnsupportedReason,
};
use crate::narrator::Narrator;
use crate::provider::{CompletionProvider, EmbeddingProvider};
use crate::router::llm::LlmRouter;
use crate::router::PatternRouter;
use crate::session::SessionHistory;
use crate::store::{TableSnapshot, TransactionStore};
use crate::tools::{create_default_registry, ToolRegistry};
use crate::index::VectorIndex;
use crate::Result;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct QueryEngine {
    config: EngineConfig,
    store: Arc<dyn TransactionStore>,
    registry: Arc<ToolRegistry>,
    pattern_router: PatternRouter,
    llm_router: LlmRouter,
    index: VectorIndex,
    narrator: Narrator,
}

impl QueryEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TransactionStore>,
        completion: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let registry = Arc::new(create_default_registry());
        let pattern_router = PatternRouter::new(registry.clone(), config.max_question_chars);
        let llm_router = LlmRouter::new(
            completion.clone(),
            registry.clone(),
            config.provider_timeout,
        );
        let index = VectorIndex::new(embedder, config.index_dir.clone());
        let narrator = Narrator::new(
            completion,
            config.temperature,
            config.max_output_tokens,
            config.provider_timeout,
        );

        Self {
            config,
            store,
            registry,
            pattern_router,
            llm_router,
            index,
            narrator,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Restore any persisted index generation and warm the index for
    /// the current table. Called once at startup.
    pub async fn warm_up(&self) -> Result<()> {
        let snapshot = self.store.snapshot().await?;
        if !self.index.load_persisted(&snapshot).await {
            self.index.rebuild_in_background(snapshot);
        }
        Ok(())
    }

    /// Answer one question. `history` is caller-owned and only grows
    /// when a turn completes.
    pub async fn ask(&self, question: &str, history: &mut SessionHistory) -> Result<AskOutcome> {
        let started = Instant::now();
        let mut trace = vec![QueryState::Received];

        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                trace.push(QueryState::Failed);
                warn!(error = %e, trace = ?trace, "snapshot unavailable, query failed");
                return Err(e);
            }
        };

        let intent = self.route(question, &snapshot).await;
        trace.push(QueryState::Routed);
        debug!(intent = %intent.label(), "question routed");

        let context = history.context_block();
        let (narration, result_summary) = match &intent {
            QueryIntent::Unsupported { reason } => {
                trace.push(QueryState::Rejected);
                (
                    crate::narrator::Narration {
                        answer: rejection_answer(*reason),
                        degraded: false,
                    },
                    format!("rejected: {}", reason),
                )
            }
            QueryIntent::DeterministicTool { name, args } => {
                trace.push(QueryState::Executing);
                match self.registry.execute(
                    name,
                    &snapshot.records,
                    args,
                    Utc::now().date_naive(),
                ) {
                    Ok(result) => {
                        trace.push(QueryState::Narrating);
                        let summary = format!(
                            "{}: count={} sum={:.2}",
                            result.tool_name, result.summary.count, result.summary.sum
                        );
                        (
                            self.narrator
                                .narrate_tool_result(question, &result, &context)
                                .await,
                            summary,
                        )
                    }
                    // a bad argument is the user's (or the classifier's)
                    // problem to restate, not a hard failure
                    Err(EngineError::InvalidArgument(detail)) => {
                        trace.push(QueryState::Narrating);
                        warn!(tool = %name, %detail, "tool arguments invalid, asking for clarification");
                        (
                            crate::narrator::Narration {
                                answer: clarification_answer(&detail),
                                degraded: false,
                            },
                            format!("clarification: {}", detail),
                        )
                    }
                    Err(e) => {
                        trace.push(QueryState::Failed);
                        warn!(error = %e, trace = ?trace, "tool execution failed");
                        return Err(e);
                    }
                }
            }
            QueryIntent::SemanticRetrieval { query_text } => {
                trace.push(QueryState::Retrieving);
                let (result, scan_degraded) = self.retrieve(&snapshot, query_text).await?;
                trace.push(QueryState::Narrating);
                let summary = format!(
                    "retrieval: {} hits{}",
                    result.hits.len(),
                    if result.possibly_stale { " (possibly stale)" } else { "" }
                );
                let mut narration = self
                    .narrator
                    .narrate_retrieval(question, &result, &context)
                    .await;
                narration.degraded |= scan_degraded;
                (narration, summary)
            }
        };

        trace.push(QueryState::Completed);
        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            intent = %intent.label(),
            latency_ms,
            degraded = narration.degraded,
            trace = ?trace,
            "query completed"
        );

        history.record(question, intent.clone(), result_summary, &narration.answer);

        Ok(AskOutcome {
            answer: narration.answer,
            intent_used: intent,
            latency_ms,
            degraded: narration.degraded,
        })
    }

    async fn route(&self, question: &str, snapshot: &TableSnapshot) -> QueryIntent {
        let known_categories: BTreeSet<String> = snapshot
            .records
            .iter()
            .map(|r| r.category.clone())
            .collect();

        if let Some(intent) = self.pattern_router.route(question, &known_categories) {
            return intent;
        }
        self.llm_router.classify(question).await
    }

    /// Semantic retrieval with a literal-scan fallback. A cold or
    /// otherwise unusable index degrades to substring matching over the
    /// snapshot instead of failing the query.
    async fn retrieve(
        &self,
        snapshot: &TableSnapshot,
        query_text: &str,
    ) -> Result<(RetrievalResult, bool)> {
        match self
            .index
            .search(snapshot, query_text, self.config.top_k, self.config.freshness_mode)
            .await
        {
            Ok(result) => Ok((result, false)),
            Err(EngineError::StoreUnavailable(msg)) => Err(EngineError::StoreUnavailable(msg)),
            Err(e) => {
                warn!(error = %e, "vector search unavailable, using literal scan");
                Ok((
                    literal_scan(&snapshot.records, query_text, self.config.top_k),
                    true,
                ))
            }
        }
    }
}

fn clarification_answer(detail: &str) -> String {
    format!(
        "I need a bit more detail to answer that ({}). Could you restate \
         the question with that included?",
        detail
    )
}

fn rejection_answer(reason: UnsupportedReason) -> String {
    match reason {
        UnsupportedReason::Empty => {
            "I did not receive a question. Ask me anything about your transactions.".to_string()
        }
        UnsupportedReason::TooLong => {
            "That question is too long for me to process. Could you shorten it?".to_string()
        }
        UnsupportedReason::NotNaturalLanguage => {
            "I could not read that as a question. Try asking in plain words, for example \
             \"how much did I spend on groceries last month?\"."
                .to_string()
        }
    }
}

/// Case-insensitive term matching over merchant, category, and notes.
/// Scores count matched terms; ties resolve toward newer rows.
fn literal_scan(records: &[TransactionRecord], query_text: &str, top_k: usize) -> RetrievalResult {
    let terms: Vec<String> = query_text
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() >= 3)
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty() {
        return RetrievalResult {
            hits: vec![],
            possibly_stale: false,
        };
    }

    let mut scored: Vec<(usize, &TransactionRecord)> = records
        .iter()
        .filter_map(|r| {
            let haystack = format!(
                "{} {} {} {}",
                r.merchant.to_lowercase(),
                r.category.to_lowercase(),
                r.subcategory.to_lowercase(),
                r.notes.to_lowercase()
            );
            let matches = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (matches > 0).then_some((matches, r))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.date.cmp(&a.1.date))
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    let term_count = terms.len() as f32;
    RetrievalResult {
        hits: scored
            .into_iter()
            .take(top_k)
            .map(|(matches, record)| RetrievedRecord {
                record: record.clone(),
                score: matches as f32 / term_count,
            })
            .collect(),
        possibly_stale: false,
    }
}
