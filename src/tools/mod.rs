//! Deterministic tool registry
//!
//! Tools are pure, side-effect-free aggregations over a transaction
//! snapshot. Registration order is stable and doubles as the router's
//! tie-break order, so it is kept in a Vec rather than a map.

pub mod args;

use crate::error::EngineError;
use crate::models::{ToolResult, ToolSummary, TransactionRecord};
use crate::tools::args::{
    date_range_arg, float_arg, group_field_arg, int_arg, months_back, required_str_arg, str_arg,
    DateRange, GroupField,
};
use crate::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row cap applied to listing tools
const MAX_ROWS: usize = 50;

/// Trait for a single deterministic tool.
///
/// Execution is synchronous and pure: same snapshot + same arguments
/// always produce bit-identical results.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Argument names in signature order; optional ones end with '?'
    fn arg_names(&self) -> &'static [&'static str];
    fn execute(
        &self,
        records: &[TransactionRecord],
        args: &Value,
        today: NaiveDate,
    ) -> Result<ToolResult>;
}

/// Tool registry with stable declaration order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Declaration position, used as the final routing tie-break.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tools.iter().position(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Human-readable signatures for the model-based router prompt.
    pub fn signatures(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| format!("{} ({}) — {}", t.name(), t.arg_names().join(", "), t.description()))
            .collect()
    }

    /// Look up and run a tool against the snapshot.
    pub fn execute(
        &self,
        name: &str,
        records: &[TransactionRecord],
        tool_args: &Value,
        today: NaiveDate,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| EngineError::ToolNotFound(name.to_string()))?;
        tool.execute(records, tool_args, today)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        create_default_registry()
    }
}

// =============================
// Shared helpers
// =============================

/// Most-recent-first ordering: timestamp descending, ties broken by the
/// stable row id descending (later rows are newer).
fn sorted_most_recent(records: &[TransactionRecord]) -> Vec<&TransactionRecord> {
    let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.id.cmp(&a.id))
    });
    sorted
}

/// Largest-amount-first ordering, deterministic on ties via row id.
fn sorted_by_amount(records: Vec<&TransactionRecord>) -> Vec<&TransactionRecord> {
    let mut sorted = records;
    sorted.sort_by(|a, b| {
        b.effective_amount()
            .partial_cmp(&a.effective_amount())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

fn in_range<'a>(
    records: &'a [TransactionRecord],
    range: &DateRange,
) -> Vec<&'a TransactionRecord> {
    records.iter().filter(|r| range.contains(r.date)).collect()
}

fn matches_merchant(record: &TransactionRecord, substr: &str) -> bool {
    record
        .merchant
        .to_lowercase()
        .contains(&substr.to_lowercase())
}

fn matches_category(record: &TransactionRecord, category: &str) -> bool {
    record.category.eq_ignore_ascii_case(category)
}

fn field_value(record: &TransactionRecord, field: GroupField) -> &str {
    match field {
        GroupField::Category => &record.category,
        GroupField::Subcategory => &record.subcategory,
        GroupField::Merchant => &record.merchant,
    }
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn row_json(record: &TransactionRecord) -> Value {
    json!({
        "date": record.date.format("%Y-%m-%d").to_string(),
        "time": record.time.map(|t| t.format("%H:%M:%S").to_string()),
        "merchant": record.merchant,
        "amount": record.effective_amount(),
        "category": record.category,
        "subcategory": record.subcategory,
        "notes": record.notes,
    })
}

fn amounts(records: &[&TransactionRecord]) -> Vec<f64> {
    records.iter().map(|r| r.effective_amount()).collect()
}

fn result_from(
    tool_name: &str,
    selected: &[&TransactionRecord],
    row_limit: usize,
    args: Value,
) -> ToolResult {
    ToolResult {
        tool_name: tool_name.to_string(),
        summary: ToolSummary::from_amounts(&amounts(selected)),
        rows: selected.iter().take(row_limit).map(|r| row_json(r)).collect(),
        args,
    }
}

// =============================
// Tools
// =============================

/// Most-recent / Nth-most-recent single record lookup.
pub struct GetLatestTool;

impl Tool for GetLatestTool {
    fn name(&self) -> &'static str {
        "get_latest"
    }

    fn description(&self) -> &'static str {
        "Return the most recent transaction(s), with an optional offset for second/third most recent"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["n?", "offset?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, _today: NaiveDate) -> Result<ToolResult> {
        let n = int_arg(args, "n", 1, 1, 10)? as usize;
        let offset = int_arg(args, "offset", 0, 0, 50)? as usize;

        let sorted = sorted_most_recent(records);
        let slice: Vec<&TransactionRecord> =
            sorted.into_iter().skip(offset).take(n).collect();

        Ok(result_from(
            self.name(),
            &slice,
            n,
            json!({ "n": n, "offset": offset }),
        ))
    }
}

/// Sum/count over all transactions whose merchant contains a substring.
pub struct SumByMerchantTool;

impl Tool for SumByMerchantTool {
    fn name(&self) -> &'static str {
        "sum_by_merchant"
    }

    fn description(&self) -> &'static str {
        "Total spending at merchants matching a case-insensitive substring"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["merchant_substr", "period?", "start_date?", "end_date?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let substr = required_str_arg(args, "merchant_substr", 60)?;
        let range = date_range_arg(args, today)?;

        let matched: Vec<&TransactionRecord> = sorted_most_recent(records)
            .into_iter()
            .filter(|r| range.contains(r.date) && matches_merchant(r, &substr))
            .collect();

        Ok(result_from(
            self.name(),
            &matched,
            MAX_ROWS,
            json!({
                "merchant_substr": substr,
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        ))
    }
}

/// Sum/count over one category (case-insensitive equality).
pub struct SumByCategoryTool;

impl Tool for SumByCategoryTool {
    fn name(&self) -> &'static str {
        "sum_by_category"
    }

    fn description(&self) -> &'static str {
        "Total spending in a named category"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["category", "period?", "start_date?", "end_date?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let category = required_str_arg(args, "category", 60)?;
        let range = date_range_arg(args, today)?;

        let matched: Vec<&TransactionRecord> = sorted_most_recent(records)
            .into_iter()
            .filter(|r| range.contains(r.date) && matches_category(r, &category))
            .collect();

        Ok(result_from(
            self.name(),
            &matched,
            MAX_ROWS,
            json!({
                "category": category,
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        ))
    }
}

/// Largest transactions, optionally filtered by window/category/merchant.
pub struct TopTransactionsTool;

impl Tool for TopTransactionsTool {
    fn name(&self) -> &'static str {
        "top_transactions"
    }

    fn description(&self) -> &'static str {
        "Top-N transactions by amount, with optional date/category/merchant filters"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["n?", "period?", "start_date?", "end_date?", "category?", "merchant_substr?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let n = int_arg(args, "n", 10, 1, 50)? as usize;
        let range = date_range_arg(args, today)?;
        let category = str_arg(args, "category", 60);
        let merchant_substr = str_arg(args, "merchant_substr", 60);

        let filtered: Vec<&TransactionRecord> = in_range(records, &range)
            .into_iter()
            .filter(|r| category.as_deref().map_or(true, |c| matches_category(r, c)))
            .filter(|r| merchant_substr.as_deref().map_or(true, |m| matches_merchant(r, m)))
            .collect();

        let top: Vec<&TransactionRecord> =
            sorted_by_amount(filtered).into_iter().take(n).collect();

        Ok(result_from(
            self.name(),
            &top,
            n,
            json!({
                "n": n,
                "category": category,
                "merchant_substr": merchant_substr,
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        ))
    }
}

/// Per-month top-k sums grouped by a chosen field.
pub struct GroupByMonthTool;

impl Tool for GroupByMonthTool {
    fn name(&self) -> &'static str {
        "group_by_month"
    }

    fn description(&self) -> &'static str {
        "Monthly spending broken down by category, subcategory, or merchant"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["period?", "start_date?", "end_date?", "field?", "top_k?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let range = date_range_arg(args, today)?;
        let field = group_field_arg(args, "field", GroupField::Category);
        let top_k = int_arg(args, "top_k", 5, 1, 10)? as usize;

        let filtered = in_range(records, &range);

        // month -> field value -> sum; BTreeMap keeps iteration stable
        let mut grouped: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for r in &filtered {
            *grouped
                .entry(month_key(r.date))
                .or_default()
                .entry(field_value(r, field).to_string())
                .or_default() += r.effective_amount();
        }

        let mut rows = Vec::new();
        for (month, values) in &grouped {
            let mut entries: Vec<(&String, &f64)> = values.iter().collect();
            entries.sort_by(|a, b| {
                b.1.partial_cmp(a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            for (value, sum) in entries.into_iter().take(top_k) {
                rows.push(json!({
                    "month": month,
                    "field": field.as_str(),
                    "value": value,
                    "sum": sum,
                }));
            }
        }
        rows.truncate(12 * top_k);

        Ok(ToolResult {
            tool_name: self.name().to_string(),
            summary: ToolSummary::from_amounts(&amounts(&filtered)),
            rows,
            args: json!({
                "field": field.as_str(),
                "top_k": top_k,
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        })
    }
}

/// Transactions at or above an amount threshold.
pub struct OutliersLargeTool;

impl Tool for OutliersLargeTool {
    fn name(&self) -> &'static str {
        "outliers_large"
    }

    fn description(&self) -> &'static str {
        "Transactions at or above an amount threshold, largest first"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["min_amount", "period?", "start_date?", "end_date?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let min_amount = float_arg(args, "min_amount", 100.0, 0.0, 1_000_000.0)?;
        let range = date_range_arg(args, today)?;

        let matched: Vec<&TransactionRecord> = sorted_by_amount(
            in_range(records, &range)
                .into_iter()
                .filter(|r| r.effective_amount() >= min_amount)
                .collect(),
        );

        Ok(result_from(
            self.name(),
            &matched,
            MAX_ROWS,
            json!({
                "min_amount": min_amount,
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        ))
    }
}

/// Merchants that repeat across months in a trailing window.
pub struct RecurringMerchantsTool;

impl Tool for RecurringMerchantsTool {
    fn name(&self) -> &'static str {
        "recurring_merchants"
    }

    fn description(&self) -> &'static str {
        "Merchants charged repeatedly across recent months (subscriptions, regular shops)"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["months?", "min_count?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, _today: NaiveDate) -> Result<ToolResult> {
        let months = int_arg(args, "months", 6, 1, 24)? as u32;
        let min_count = int_arg(args, "min_count", 3, 2, 20)? as usize;

        let Some(anchor) = records.iter().map(|r| r.date).max() else {
            return Ok(ToolResult {
                tool_name: self.name().to_string(),
                summary: ToolSummary::from_amounts(&[]),
                rows: vec![],
                args: json!({ "months": months, "min_count": min_count }),
            });
        };
        let window_start = months_back(anchor, months);

        struct Acc {
            count: usize,
            sum: f64,
            months_active: std::collections::BTreeSet<String>,
        }

        let mut by_merchant: BTreeMap<String, Acc> = BTreeMap::new();
        for r in records.iter().filter(|r| r.date >= window_start) {
            let acc = by_merchant.entry(r.merchant.clone()).or_insert(Acc {
                count: 0,
                sum: 0.0,
                months_active: Default::default(),
            });
            acc.count += 1;
            acc.sum += r.effective_amount();
            acc.months_active.insert(month_key(r.date));
        }

        let mut recurring: Vec<(String, Acc)> = by_merchant
            .into_iter()
            .filter(|(_, acc)| acc.count >= min_count && acc.months_active.len() >= 2)
            .collect();
        recurring.sort_by(|a, b| {
            b.1.months_active
                .len()
                .cmp(&a.1.months_active.len())
                .then_with(|| b.1.sum.partial_cmp(&a.1.sum).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.0.cmp(&b.0))
        });

        let rows: Vec<Value> = recurring
            .iter()
            .take(30)
            .map(|(merchant, acc)| {
                json!({
                    "merchant": merchant,
                    "txn_count": acc.count,
                    "months_active": acc.months_active.len(),
                    "sum": acc.sum,
                })
            })
            .collect();

        let sums: Vec<f64> = recurring.iter().map(|(_, acc)| acc.sum).collect();

        Ok(ToolResult {
            tool_name: self.name().to_string(),
            summary: ToolSummary::from_amounts(&sums),
            rows,
            args: json!({
                "months": months,
                "min_count": min_count,
                "window_start": window_start.to_string(),
            }),
        })
    }
}

/// Grouped sums for a single merchant.
pub struct MerchantBreakdownTool;

impl Tool for MerchantBreakdownTool {
    fn name(&self) -> &'static str {
        "merchant_breakdown"
    }

    fn description(&self) -> &'static str {
        "Spending at one merchant broken down by category or subcategory"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["merchant_substr", "by?", "period?", "start_date?", "end_date?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, today: NaiveDate) -> Result<ToolResult> {
        let substr = required_str_arg(args, "merchant_substr", 60)?;
        let by = group_field_arg(args, "by", GroupField::Category);
        let range = date_range_arg(args, today)?;

        let matched: Vec<&TransactionRecord> = in_range(records, &range)
            .into_iter()
            .filter(|r| matches_merchant(r, &substr))
            .collect();

        let mut grouped: BTreeMap<String, f64> = BTreeMap::new();
        for r in &matched {
            *grouped.entry(field_value(r, by).to_string()).or_default() += r.effective_amount();
        }

        let mut entries: Vec<(String, f64)> = grouped.into_iter().collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let rows: Vec<Value> = entries
            .into_iter()
            .take(20)
            .map(|(value, sum)| json!({ "by": by.as_str(), "value": value, "sum": sum }))
            .collect();

        Ok(ToolResult {
            tool_name: self.name().to_string(),
            summary: ToolSummary::from_amounts(&amounts(&matched)),
            rows,
            args: json!({
                "merchant_substr": substr,
                "by": by.as_str(),
                "start_date": range.start.map(|d| d.to_string()),
                "end_date": range.end.map(|d| d.to_string()),
            }),
        })
    }
}

/// Monthly sums for one category over a trailing window.
pub struct CategoryTrendTool;

impl Tool for CategoryTrendTool {
    fn name(&self) -> &'static str {
        "category_trend"
    }

    fn description(&self) -> &'static str {
        "Month-by-month spending trend for one category"
    }

    fn arg_names(&self) -> &'static [&'static str] {
        &["category", "months?"]
    }

    fn execute(&self, records: &[TransactionRecord], args: &Value, _today: NaiveDate) -> Result<ToolResult> {
        let category = required_str_arg(args, "category", 60)?;
        let months = int_arg(args, "months", 6, 1, 24)? as u32;

        let Some(anchor) = records.iter().map(|r| r.date).max() else {
            return Ok(ToolResult {
                tool_name: self.name().to_string(),
                summary: ToolSummary::from_amounts(&[]),
                rows: vec![],
                args: json!({ "category": category, "months": months }),
            });
        };
        let window_start = months_back(anchor, months);

        let matched: Vec<&TransactionRecord> = records
            .iter()
            .filter(|r| r.date >= window_start && matches_category(r, &category))
            .collect();

        let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
        for r in &matched {
            *by_month.entry(month_key(r.date)).or_default() += r.effective_amount();
        }

        let rows: Vec<Value> = by_month
            .into_iter()
            .map(|(month, sum)| json!({ "month": month, "sum": sum }))
            .collect();

        Ok(ToolResult {
            tool_name: self.name().to_string(),
            summary: ToolSummary::from_amounts(&amounts(&matched)),
            rows,
            args: json!({
                "category": category,
                "months": months,
                "window_start": window_start.to_string(),
            }),
        })
    }
}

/// Registry in declaration order. Order matters: routing tie-breaks
/// resolve toward earlier entries.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetLatestTool));
    registry.register(Arc::new(SumByMerchantTool));
    registry.register(Arc::new(SumByCategoryTool));
    registry.register(Arc::new(TopTransactionsTool));
    registry.register(Arc::new(GroupByMonthTool));
    registry.register(Arc::new(OutliersLargeTool));
    registry.register(Arc::new(RecurringMerchantsTool));
    registry.register(Arc::new(MerchantBreakdownTool));
    registry.register(Arc::new(CategoryTrendTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, date: &str, merchant: &str, amount: f64, category: &str) -> TransactionRecord {
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

    fn sample_table() -> Vec<TransactionRecord> {
        vec![
            record(0, "2025-01-01", "K-Market Vuorela", 14.93, "Groceries"),
            record(1, "2025-01-15", "Prisma Kuopio", 30.50, "Groceries"),
            record(2, "2025-02-01", "Cursor Ai Powered Ide", 20.00, "Shopping"),
            record(3, "2025-01-20", "Prisma Tampereentie", 15.00, "Groceries"),
            record(4, "2025-01-22", "Netflix", 12.99, "Bills"),
            record(5, "2024-12-22", "Netflix", 12.99, "Bills"),
            record(6, "2024-11-22", "Netflix", 12.99, "Bills"),
        ]
    }

    fn today() -> NaiveDate {
        "2025-02-10".parse().unwrap()
    }

    #[test]
    fn test_get_latest_picks_newest() {
        let table = sample_table();
        let result = GetLatestTool.execute(&table, &json!({}), today()).unwrap();
        assert_eq!(result.summary.count, 1);
        assert_eq!(result.rows[0]["date"], "2025-02-01");
        assert_eq!(result.rows[0]["merchant"], "Cursor Ai Powered Ide");
    }

    #[test]
    fn test_get_latest_offset_second() {
        let table = sample_table();
        let result = GetLatestTool
            .execute(&table, &json!({ "offset": 1 }), today())
            .unwrap();
        assert_eq!(result.rows[0]["date"], "2025-01-22");
    }

    #[test]
    fn test_sum_by_merchant_prisma_scenario() {
        let table = sample_table();
        let result = SumByMerchantTool
            .execute(&table, &json!({ "merchant_substr": "Prisma" }), today())
            .unwrap();
        assert_eq!(result.summary.count, 2);
        assert!((result.summary.sum - 45.50).abs() < 1e-9);
    }

    #[test]
    fn test_sum_by_merchant_requires_substring() {
        let table = sample_table();
        assert!(matches!(
            SumByMerchantTool.execute(&table, &json!({}), today()),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sum_by_category_case_insensitive() {
        let table = sample_table();
        let result = SumByCategoryTool
            .execute(&table, &json!({ "category": "groceries" }), today())
            .unwrap();
        assert_eq!(result.summary.count, 3);
    }

    #[test]
    fn test_top_transactions_order() {
        let table = sample_table();
        let result = TopTransactionsTool
            .execute(&table, &json!({ "n": 2 }), today())
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["merchant"], "Prisma Kuopio");
        assert_eq!(result.rows[1]["merchant"], "Cursor Ai Powered Ide");
    }

    #[test]
    fn test_group_by_month_rows() {
        let table = sample_table();
        let result = GroupByMonthTool
            .execute(&table, &json!({ "top_k": 2 }), today())
            .unwrap();
        // four distinct months in the table
        let months: std::collections::BTreeSet<&str> = result
            .rows
            .iter()
            .map(|r| r["month"].as_str().unwrap())
            .collect();
        assert!(months.contains("2025-01"));
        assert!(months.contains("2024-11"));
    }

    #[test]
    fn test_outliers_threshold() {
        let table = sample_table();
        let result = OutliersLargeTool
            .execute(&table, &json!({ "min_amount": 15.0 }), today())
            .unwrap();
        assert_eq!(result.summary.count, 3);
        assert_eq!(result.rows[0]["amount"], 30.50);
    }

    #[test]
    fn test_recurring_merchants_finds_netflix() {
        let table = sample_table();
        let result = RecurringMerchantsTool
            .execute(&table, &json!({ "months": 6, "min_count": 3 }), today())
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["merchant"], "Netflix");
        assert_eq!(result.rows[0]["months_active"], 3);
    }

    #[test]
    fn test_merchant_breakdown_groups() {
        let table = sample_table();
        let result = MerchantBreakdownTool
            .execute(&table, &json!({ "merchant_substr": "Prisma" }), today())
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["value"], "Groceries");
    }

    #[test]
    fn test_category_trend_monthly_sums() {
        let table = sample_table();
        let result = CategoryTrendTool
            .execute(&table, &json!({ "category": "Bills", "months": 6 }), today())
            .unwrap();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0]["month"], "2024-11");
    }

    #[test]
    fn test_tools_are_pure() {
        let table = sample_table();
        let args = json!({ "merchant_substr": "Prisma" });
        let a = SumByMerchantTool.execute(&table, &args, today()).unwrap();
        let b = SumByMerchantTool.execute(&table, &args, today()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_registry_declaration_order() {
        let registry = create_default_registry();
        assert_eq!(registry.position("get_latest"), Some(0));
        assert_eq!(registry.position("category_trend"), Some(8));
        assert_eq!(registry.list().len(), 9);
    }

    #[test]
    fn test_registry_execute_unknown_tool() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.execute("no_such_tool", &sample_table(), &json!({}), today()),
            Err(EngineError::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_empty_table_yields_zero_summary() {
        let result = GetLatestTool.execute(&[], &json!({}), today()).unwrap();
        assert_eq!(result.summary.count, 0);
        assert!(result.rows.is_empty());
    }
}
