//! Core data models for the query resolution engine

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Transactions =================
//

/// Immutable snapshot of a single transaction row.
///
/// Owned by the transaction store; the engine only ever holds read-only
/// references (or cheap clones) for the duration of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Stable row position within the snapshot
    pub id: u64,
    pub date: NaiveDate,
    /// Optional time-of-day, used to break same-day ordering
    pub time: Option<NaiveTime>,
    pub merchant: String,
    pub amount: f64,
    /// Cost-allocation adjusted amount; equals `amount` when no
    /// adjustment applies
    pub adjusted_amount: f64,
    pub category: String,
    pub subcategory: String,
    pub notes: String,
}

impl TransactionRecord {
    /// Amount used by all aggregations (the adjusted column wins).
    pub fn effective_amount(&self) -> f64 {
        self.adjusted_amount
    }

    /// Combined date + time for "most recent" ordering. Missing times
    /// sort at midnight.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date
            .and_time(self.time.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap()))
    }

    /// Deterministic textual serialization used for embedding.
    ///
    /// Format: "2025-01-01 Prisma €50.00 Groceries General"
    pub fn source_text(&self) -> String {
        let mut text = format!(
            "{} {} €{:.2} {} {}",
            self.date, self.merchant, self.effective_amount(), self.category, self.subcategory
        )
        .trim_end()
        .to_string();
        if !self.notes.is_empty() {
            text.push(' ');
            text.push_str(&self.notes);
        }
        text
    }
}

/// Cheap, deterministic summary of table content used to detect change.
/// Comparison is O(1); construction hashes the snapshot once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedReason {
    Empty,
    TooLong,
    NotNaturalLanguage,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnsupportedReason::Empty => "the question was empty",
            UnsupportedReason::TooLong => "the question exceeded the input size bound",
            UnsupportedReason::NotNaturalLanguage => "the question did not look like natural language",
        };
        write!(f, "{}", s)
    }
}

/// Router output: exactly one intent per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryIntent {
    DeterministicTool {
        name: String,
        args: serde_json::Value,
    },
    SemanticRetrieval {
        query_text: String,
    },
    Unsupported {
        reason: UnsupportedReason,
    },
}

impl QueryIntent {
    pub fn label(&self) -> &'static str {
        match self {
            QueryIntent::DeterministicTool { .. } => "deterministic_tool",
            QueryIntent::SemanticRetrieval { .. } => "semantic_retrieval",
            QueryIntent::Unsupported { .. } => "unsupported",
        }
    }
}

//
// ================= Tool Results =================
//

/// Basic statistics over the effective amounts of a row subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub median: f64,
    pub max: f64,
}

impl ToolSummary {
    pub fn from_amounts(amounts: &[f64]) -> Self {
        if amounts.is_empty() {
            return Self { count: 0, sum: 0.0, avg: 0.0, median: 0.0, max: 0.0 };
        }

        let sum: f64 = amounts.iter().sum();
        let max = amounts.iter().cloned().fold(f64::MIN, f64::max);

        let mut sorted = amounts.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self {
            count: amounts.len(),
            sum,
            avg: sum / amounts.len() as f64,
            median,
            max,
        }
    }
}

/// Immutable output of a single deterministic tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub summary: ToolSummary,
    /// JSON-serializable rows (bounded per tool)
    pub rows: Vec<serde_json::Value>,
    /// Validated arguments the tool actually ran with
    pub args: serde_json::Value,
}

//
// ================= Retrieval =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    pub record: TransactionRecord,
    pub score: f32,
}

/// Ordered top-k semantic search result. Scores descend; ties break by
/// record id so repeated queries against an unchanged index reproduce
/// byte-identical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedRecord>,
    /// Set when results were served from an index known to lag the
    /// current table fingerprint (eventual-freshness mode)
    pub possibly_stale: bool,
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub question: String,
    pub intent: QueryIntent,
    pub result_summary: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

//
// ================= Query Lifecycle =================
//

/// Orchestrator state machine. `Failed` is reachable from any
/// non-terminal state, but only on non-recoverable infrastructure
/// faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    Received,
    Routed,
    Executing,
    Retrieving,
    Rejected,
    Narrating,
    Completed,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Received => "received",
            QueryState::Routed => "routed",
            QueryState::Executing => "executing",
            QueryState::Retrieving => "retrieving",
            QueryState::Rejected => "rejected",
            QueryState::Narrating => "narrating",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Final answer envelope returned by `Engine::ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskOutcome {
    pub answer: String,
    pub intent_used: QueryIntent,
    pub latency_ms: u64,
    /// True when the answer came from the templated fallback or a
    /// degraded retrieval path rather than full narration
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn record(id: u64, date: &str, merchant: &str, amount: f64, category: &str) -> TransactionRecord {
        TransactionRecord {
            id,
            date: date.parse().unwrap(),
            time: None,
            merchant: merchant.to_string(),
            amount,
            adjusted_amount: amount,
            category: category.to_string(),
            subcategory: "General".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_source_text_is_deterministic() {
        let r = record(0, "2025-01-01", "Prisma", 50.0, "Groceries");
        assert_eq!(r.source_text(), "2025-01-01 Prisma €50.00 Groceries General");
        assert_eq!(r.source_text(), r.source_text());
    }

    #[test]
    fn test_source_text_appends_notes() {
        let mut r = record(0, "2025-01-01", "Prisma", 50.0, "Groceries");
        r.notes = "/50%".to_string();
        assert!(r.source_text().ends_with("/50%"));
    }

    #[test]
    fn test_summary_stats() {
        let s = ToolSummary::from_amounts(&[10.0, 20.0, 30.0]);
        assert_eq!(s.count, 3);
        assert!((s.sum - 60.0).abs() < f64::EPSILON);
        assert!((s.avg - 20.0).abs() < f64::EPSILON);
        assert!((s.median - 20.0).abs() < f64::EPSILON);
        assert!((s.max - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_stats_empty() {
        let s = ToolSummary::from_amounts(&[]);
        assert_eq!(s.count, 0);
        assert_eq!(s.sum, 0.0);
    }

    #[test]
    fn test_timestamp_uses_midnight_for_missing_time() {
        let r = record(0, "2025-02-01", "X", 1.0, "C");
        assert_eq!(r.timestamp().to_string(), "2025-02-01 00:00:00");
    }
}
