//! Query routing
//!
//! Routing runs in two stages. Deterministic pattern rules fire first
//! and always win; only when no rule matches is the model-based
//! classifier in [`llm`] consulted. Pattern routing is pure: the same
//! question against the same registry yields the same intent.

pub mod llm;

use crate::models::{QueryIntent, UnsupportedReason};
use crate::tools::ToolRegistry;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Deterministic first-stage router.
pub struct PatternRouter {
    registry: Arc<ToolRegistry>,
    max_question_chars: usize,
}

/// A rule match before selection. `bound` counts the arguments the rule
/// managed to extract from the question.
struct Candidate {
    tool: &'static str,
    args: Value,
    bound: usize,
}

impl PatternRouter {
    pub fn new(registry: Arc<ToolRegistry>, max_question_chars: usize) -> Self {
        Self {
            registry,
            max_question_chars,
        }
    }

    /// Input guards, checked before any rule runs.
    pub fn guard(&self, question: &str) -> Option<UnsupportedReason> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Some(UnsupportedReason::Empty);
        }
        if question.chars().count() > self.max_question_chars {
            return Some(UnsupportedReason::TooLong);
        }
        if !trimmed.chars().any(|c| c.is_alphabetic()) {
            return Some(UnsupportedReason::NotNaturalLanguage);
        }
        None
    }

    /// Run the pattern rules. `known_categories` comes from the current
    /// snapshot and gates the category rule so that "spend on pizza"
    /// does not bind a nonexistent category.
    pub fn route(
        &self,
        question: &str,
        known_categories: &BTreeSet<String>,
    ) -> Option<QueryIntent> {
        if let Some(reason) = self.guard(question) {
            return Some(QueryIntent::Unsupported { reason });
        }

        let lowered = question.to_lowercase();
        let mut candidates = Vec::new();

        self.rule_latest(&lowered, &mut candidates);
        self.rule_top_n(&lowered, &mut candidates);
        self.rule_spend_at(&lowered, &mut candidates);
        self.rule_spend_on_category(&lowered, known_categories, &mut candidates);
        self.rule_over_amount(&lowered, &mut candidates);
        self.rule_recurring(&lowered, &mut candidates);
        self.rule_monthly(&lowered, &mut candidates);

        self.select(candidates)
    }

    /// Most bound arguments wins; ties resolve toward the tool declared
    /// earlier in the registry.
    fn select(&self, candidates: Vec<Candidate>) -> Option<QueryIntent> {
        candidates
            .into_iter()
            .filter_map(|c| {
                self.registry
                    .position(c.tool)
                    .map(|pos| (c.bound, pos, c))
            })
            .max_by(|(bound_a, pos_a, _), (bound_b, pos_b, _)| {
                bound_a.cmp(bound_b).then_with(|| pos_b.cmp(pos_a))
            })
            .map(|(_, _, c)| QueryIntent::DeterministicTool {
                name: c.tool.to_string(),
                args: c.args,
            })
    }

    fn rule_latest(&self, lowered: &str, out: &mut Vec<Candidate>) {
        let mentions_txn = lowered.contains("transaction")
            || lowered.contains("purchase")
            || lowered.contains("payment")
            || lowered.contains("charge");
        let latest = lowered.contains("latest")
            || lowered.contains("most recent")
            || (lowered.contains("last") && mentions_txn);
        if !latest && !mentions_txn {
            return;
        }
        if !latest && !(lowered.contains("recent") || lowered.contains("newest")) {
            return;
        }

        let offset = if lowered.contains("third") || lowered.contains("3rd") {
            2
        } else if lowered.contains("second") || lowered.contains("2nd") {
            1
        } else {
            0
        };
        out.push(Candidate {
            tool: "get_latest",
            args: json!({ "n": 1, "offset": offset }),
            bound: if offset > 0 { 2 } else { 1 },
        });
    }

    fn rule_top_n(&self, lowered: &str, out: &mut Vec<Candidate>) {
        let keyword = ["top", "biggest", "largest"]
            .iter()
            .find(|k| lowered.contains(**k));
        let Some(keyword) = keyword else { return };

        let n = number_after(lowered, keyword).map(|v| v as i64);
        let mut args = json!({});
        let mut bound = 0;
        if let Some(n) = n {
            args["n"] = json!(n.clamp(1, 50));
            bound += 1;
        }
        out.push(Candidate {
            tool: "top_transactions",
            args,
            bound,
        });
    }

    fn rule_spend_at(&self, lowered: &str, out: &mut Vec<Candidate>) {
        let spend = lowered.contains("spend")
            || lowered.contains("spent")
            || lowered.contains("paid")
            || lowered.contains("pay");
        if !spend {
            return;
        }
        let Some(merchant) = tail_after(lowered, " at ") else {
            return;
        };
        out.push(Candidate {
            tool: "sum_by_merchant",
            args: json!({ "merchant_substr": merchant }),
            bound: 2,
        });
    }

    fn rule_spend_on_category(
        &self,
        lowered: &str,
        known_categories: &BTreeSet<String>,
        out: &mut Vec<Candidate>,
    ) {
        let spend = lowered.contains("spend") || lowered.contains("spent");
        if !spend {
            return;
        }
        let Some(tail) = tail_after(lowered, " on ") else {
            return;
        };
        // the tail must name a category that actually exists
        let matched = known_categories
            .iter()
            .find(|c| c.to_lowercase() == tail || tail.starts_with(&c.to_lowercase()));
        if let Some(category) = matched {
            out.push(Candidate {
                tool: "sum_by_category",
                args: json!({ "category": category }),
                bound: 2,
            });
        }
    }

    fn rule_over_amount(&self, lowered: &str, out: &mut Vec<Candidate>) {
        let keyword = ["over €", "above €", "over ", "above ", "more than "]
            .iter()
            .find(|k| lowered.contains(**k) && number_after(lowered, k).is_some());
        let Some(keyword) = keyword else { return };
        let min_amount = match number_after(lowered, keyword) {
            Some(v) => v,
            None => return,
        };
        out.push(Candidate {
            tool: "outliers_large",
            args: json!({ "min_amount": min_amount }),
            bound: 1,
        });
    }

    fn rule_recurring(&self, lowered: &str, out: &mut Vec<Candidate>) {
        if lowered.contains("recurring") || lowered.contains("subscription") {
            out.push(Candidate {
                tool: "recurring_merchants",
                args: json!({}),
                bound: 1,
            });
        }
    }

    fn rule_monthly(&self, lowered: &str, out: &mut Vec<Candidate>) {
        let monthly = lowered.contains("monthly")
            || lowered.contains("per month")
            || lowered.contains("each month")
            || lowered.contains("by month")
            || lowered.contains("month by month");
        if monthly && (lowered.contains("breakdown") || lowered.contains("spending")) {
            out.push(Candidate {
                tool: "group_by_month",
                args: json!({}),
                bound: 1,
            });
        }
    }
}

/// First number appearing after `keyword`, tolerating currency symbols
/// and thousands separators ("top 5", "over €1,000").
fn number_after(lowered: &str, keyword: &str) -> Option<f64> {
    let idx = lowered.find(keyword)?;
    let tail = &lowered[idx + keyword.len()..];
    let digits: String = tail
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Words following the last occurrence of `marker`, stripped of trailing
/// punctuation and filler question tails.
fn tail_after(lowered: &str, marker: &str) -> Option<String> {
    let idx = lowered.rfind(marker)?;
    let tail = lowered[idx + marker.len()..]
        .trim()
        .trim_end_matches(['?', '!', '.', ','])
        .trim();
    let tail = tail
        .strip_suffix(" this month")
        .or_else(|| tail.strip_suffix(" last month"))
        .or_else(|| tail.strip_suffix(" this year"))
        .unwrap_or(tail)
        .trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::create_default_registry;

    fn router() -> PatternRouter {
        PatternRouter::new(Arc::new(create_default_registry()), 2000)
    }

    fn categories() -> BTreeSet<String> {
        ["Groceries", "Bills", "Shopping"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn expect_tool(intent: QueryIntent) -> (String, Value) {
        match intent {
            QueryIntent::DeterministicTool { name, args } => (name, args),
            other => panic!("expected tool intent, got {:?}", other),
        }
    }

    #[test]
    fn test_guard_empty() {
        let intent = router().route("   ", &categories()).unwrap();
        assert!(matches!(
            intent,
            QueryIntent::Unsupported {
                reason: UnsupportedReason::Empty
            }
        ));
    }

    #[test]
    fn test_guard_too_long() {
        let long = "a".repeat(2001);
        let intent = router().route(&long, &categories()).unwrap();
        assert!(matches!(
            intent,
            QueryIntent::Unsupported {
                reason: UnsupportedReason::TooLong
            }
        ));
    }

    #[test]
    fn test_guard_not_natural_language() {
        let intent = router().route("12345 !!! 678", &categories()).unwrap();
        assert!(matches!(
            intent,
            QueryIntent::Unsupported {
                reason: UnsupportedReason::NotNaturalLanguage
            }
        ));
    }

    #[test]
    fn test_latest_transaction() {
        let (name, args) = expect_tool(
            router()
                .route("What was my most recent transaction?", &categories())
                .unwrap(),
        );
        assert_eq!(name, "get_latest");
        assert_eq!(args["offset"], 0);
    }

    #[test]
    fn test_second_latest_transaction() {
        let (name, args) = expect_tool(
            router()
                .route("show my second latest purchase", &categories())
                .unwrap(),
        );
        assert_eq!(name, "get_latest");
        assert_eq!(args["offset"], 1);
    }

    #[test]
    fn test_top_n_binds_count() {
        let (name, args) = expect_tool(
            router()
                .route("top 5 biggest payments this year", &categories())
                .unwrap(),
        );
        assert_eq!(name, "top_transactions");
        assert_eq!(args["n"], 5);
    }

    #[test]
    fn test_spend_at_merchant() {
        let (name, args) = expect_tool(
            router()
                .route("How much did I spend at Prisma?", &categories())
                .unwrap(),
        );
        assert_eq!(name, "sum_by_merchant");
        assert_eq!(args["merchant_substr"], "prisma");
    }

    #[test]
    fn test_spend_on_known_category() {
        let (name, args) = expect_tool(
            router()
                .route("how much did I spend on groceries", &categories())
                .unwrap(),
        );
        assert_eq!(name, "sum_by_category");
        assert_eq!(args["category"], "Groceries");
    }

    #[test]
    fn test_spend_on_unknown_category_no_match() {
        assert!(router()
            .route("how much did I spend on pizza", &categories())
            .is_none());
    }

    #[test]
    fn test_over_amount() {
        let (name, args) = expect_tool(
            router()
                .route("any transactions over €100?", &categories())
                .unwrap(),
        );
        assert_eq!(name, "outliers_large");
        assert_eq!(args["min_amount"], 100.0);
    }

    #[test]
    fn test_recurring() {
        let (name, _) = expect_tool(
            router()
                .route("which subscriptions am I paying for", &categories())
                .unwrap(),
        );
        assert_eq!(name, "recurring_merchants");
    }

    #[test]
    fn test_monthly_breakdown() {
        let (name, _) = expect_tool(
            router()
                .route("give me a monthly breakdown", &categories())
                .unwrap(),
        );
        assert_eq!(name, "group_by_month");
    }

    #[test]
    fn test_tie_break_prefers_more_bound_args() {
        // "spend at X" binds two args, the bare top rule binds zero
        let (name, _) = expect_tool(
            router()
                .route("how much did I spend at the biggest store at Prisma", &categories())
                .unwrap(),
        );
        assert_eq!(name, "sum_by_merchant");
    }

    #[test]
    fn test_no_rule_matches_free_text() {
        assert!(router()
            .route("tell me something interesting about my habits", &categories())
            .is_none());
    }

    #[test]
    fn test_routing_is_stable() {
        let r = router();
        let cats = categories();
        let a = r.route("top 3 purchases", &cats);
        let b = r.route("top 3 purchases", &cats);
        assert_eq!(a, b);
    }
}
