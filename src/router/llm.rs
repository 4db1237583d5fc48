//! Model-based routing fallback
//!
//! Consulted only when no pattern rule fires. The classifier asks the
//! completion provider for a single strict-JSON plan naming one tool
//! from the registry, or `"none"` to hand the question to semantic
//! retrieval. Anything the model gets wrong degrades to retrieval
//! rather than failing the query.

use crate::models::QueryIntent;
use crate::provider::{ChatMessage, CompletionProvider};
use crate::tools::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CLASSIFIER_MAX_TOKENS: u32 = 300;

pub struct LlmRouter {
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl LlmRouter {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<ToolRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            timeout,
        }
    }

    /// Classify a question into a tool plan or semantic retrieval.
    /// Never returns an error: provider trouble means retrieval.
    pub async fn classify(&self, question: &str) -> QueryIntent {
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(question.to_string()),
        ];

        let call = self.provider.complete(&messages, 0.0, CLASSIFIER_MAX_TOKENS);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "classifier call failed, falling back to retrieval");
                return QueryIntent::SemanticRetrieval {
                    query_text: question.to_string(),
                };
            }
            Err(_) => {
                warn!("classifier call timed out, falling back to retrieval");
                return QueryIntent::SemanticRetrieval {
                    query_text: question.to_string(),
                };
            }
        };

        match self.parse_plan(&raw) {
            Some(intent) => intent,
            None => {
                debug!(raw = %raw, "classifier output not usable, falling back to retrieval");
                QueryIntent::SemanticRetrieval {
                    query_text: question.to_string(),
                }
            }
        }
    }

    fn system_prompt(&self) -> String {
        let signatures = self.registry.signatures().join("\n");
        format!(
            "You classify questions about a personal transaction table into tool calls.\n\
             Available tools:\n{signatures}\n\n\
             Respond with ONLY a JSON object, no prose, no code fences:\n\
             {{\"tool\": \"<tool name or none>\", \"args\": {{...}}}}\n\n\
             Rules:\n\
             - Pick a tool only when the question is a concrete aggregation it can answer.\n\
             - Use \"none\" for open-ended, comparative, or fuzzy questions.\n\
             - Dates are YYYY-MM-DD. Relative windows use the \"period\" argument with one of: \
             last_7_days, last_30_days, last_90_days, this_month, last_month, this_year, last_year.\n\
             - Never invent argument names that are not in the tool signature."
        )
    }

    /// Tolerant plan extraction: strips code fences, then takes the
    /// first balanced `{...}` block.
    fn parse_plan(&self, raw: &str) -> Option<QueryIntent> {
        let cleaned = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let json_str = extract_json_object(cleaned)?;
        let value: Value = serde_json::from_str(json_str).ok()?;

        let tool = value.get("tool")?.as_str()?.trim().to_string();
        if tool.is_empty() || tool == "none" {
            return None;
        }
        if self.registry.get(&tool).is_none() {
            warn!(%tool, "classifier named an unknown tool");
            return None;
        }

        let args = match value.get("args") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(_) => return None,
        };

        Some(QueryIntent::DeterministicTool { name: tool, args })
    }
}

/// First balanced top-level JSON object in the text.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
