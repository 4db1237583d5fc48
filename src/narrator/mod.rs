//! Answer narration
//!
//! The narrator turns a tool result or a retrieval hit list into a
//! short natural-language answer. The model only ever sees a FACTS
//! block of precomputed figures and is instructed to restate them, not
//! derive new ones. If the provider times out, rate limits past one
//! retry, or returns nothing usable, a deterministic template renders
//! the same figures so the caller always gets an answer.

use crate::models::{RetrievalResult, ToolResult};
use crate::provider::{ChatMessage, CompletionProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You are a personal finance assistant answering questions about the \
user's own transactions.\n\
You are given a FACTS block of precomputed figures in JSON.\n\
Rules:\n\
- Use ONLY the FACTS block. Never compute, estimate, or round figures yourself.\n\
- Repeat amounts exactly as given, formatted as euros with two decimals.\n\
- Answer in 1-3 sentences, directly addressing the question.\n\
- If the FACTS block is empty or has zero matching rows, say so plainly.";

/// Pause before the single retry so a rate-limited provider gets a
/// moment to recover instead of an immediate second hit.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// A narrated answer. `degraded` is set when the template fallback was
/// used instead of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub answer: String,
    pub degraded: bool,
}

pub struct Narrator {
    provider: Arc<dyn CompletionProvider>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl Narrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout,
        }
    }

    pub async fn narrate_tool_result(
        &self,
        question: &str,
        result: &ToolResult,
        history_context: &str,
    ) -> Narration {
        let facts = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
        let fallback = render_tool_result(result);
        self.narrate(question, &facts, history_context, fallback, false)
            .await
    }

    pub async fn narrate_retrieval(
        &self,
        question: &str,
        result: &RetrievalResult,
        history_context: &str,
    ) -> Narration {
        let mut facts = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
        facts.push_str(
            "\n(The rows above are only the closest matches, not every transaction. \
             Do not claim the list is complete.)",
        );
        let fallback = render_retrieval(result);
        self.narrate(question, &facts, history_context, fallback, result.possibly_stale)
            .await
    }

    async fn narrate(
        &self,
        question: &str,
        facts: &str,
        history_context: &str,
        fallback: String,
        possibly_stale: bool,
    ) -> Narration {
        let mut user = String::new();
        if !history_context.is_empty() {
            user.push_str("Previous conversation:\n");
            user.push_str(history_context);
            user.push_str("\n\n");
        }
        user.push_str("FACTS:\n");
        user.push_str(facts);
        if possibly_stale {
            user.push_str("\n\nNote: the retrieved rows may lag recent data changes. Mention this briefly.");
        }
        user.push_str("\n\nQuestion: ");
        user.push_str(question);

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)];

        let mut narration = match self.complete_with_retry(&messages).await {
            Some(answer) => Narration {
                answer,
                degraded: false,
            },
            None => Narration {
                answer: fallback,
                degraded: true,
            },
        };

        if possibly_stale && narration.degraded {
            narration
                .answer
                .push_str(" Note: results may not reflect the very latest data changes.");
        }
        narration
    }

    /// One attempt plus one retry, but only when the failure looks
    /// transient. A hard failure or a second transient one gives up.
    async fn complete_with_retry(&self, messages: &[ChatMessage]) -> Option<String> {
        for attempt in 0..2 {
            let call = self
                .provider
                .complete(messages, self.temperature, self.max_tokens);
            match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(answer)) if !answer.trim().is_empty() => {
                    return Some(answer.trim().to_string())
                }
                Ok(Ok(_)) => {
                    warn!("narrator returned empty answer, using template");
                    return None;
                }
                Ok(Err(e)) if e.is_transient_provider() && attempt == 0 => {
                    warn!(error = %e, "transient narrator failure, retrying once");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "narrator failed, using template");
                    return None;
                }
                Err(_) if attempt == 0 => {
                    warn!("narrator timed out, retrying once");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(_) => {
                    warn!("narrator timed out twice, using template");
                    return None;
                }
            }
        }
        None
    }
}

fn euros(amount: f64) -> String {
    format!("€{:.2}", amount)
}

/// Deterministic rendering of a tool result, used when the model is
/// unavailable. Carries the exact figures the model would have seen.
pub(crate) fn render_tool_result(result: &ToolResult) -> String {
    let s = &result.summary;
    if s.count == 0 {
        return "No matching transactions were found.".to_string();
    }

    let mut answer = format!(
        "Found {} matching transaction{}: total {}, average {}, largest {}.",
        s.count,
        if s.count == 1 { "" } else { "s" },
        euros(s.sum),
        euros(s.avg),
        euros(s.max),
    );

    let listed: Vec<String> = result
        .rows
        .iter()
        .take(3)
        .filter_map(|row| {
            let merchant = row.get("merchant")?.as_str()?;
            let date = row.get("date")?.as_str()?;
            let amount = row.get("amount")?.as_f64()?;
            Some(format!("{} at {} ({})", euros(amount), merchant, date))
        })
        .collect();
    if !listed.is_empty() {
        answer.push_str(" Including: ");
        answer.push_str(&listed.join("; "));
        answer.push('.');
    }
    answer
}

pub(crate) fn render_retrieval(result: &RetrievalResult) -> String {
    if result.hits.is_empty() {
        return "No related transactions were found.".to_string();
    }

    let listed: Vec<String> = result
        .hits
        .iter()
        .take(5)
        .map(|hit| {
            format!(
                "{} at {} on {} ({})",
                euros(hit.record.effective_amount()),
                hit.record.merchant,
                hit.record.date.format("%Y-%m-%d"),
                hit.record.category,
            )
        })
        .collect();

    format!(
        "The most relevant transactions are: {}.",
        listed.join("; ")
    )
}
