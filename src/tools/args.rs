//! Typed tool-argument validation
//!
//! Router output arrives as loose JSON (either from pattern rules or
//! from the model-based classifier). Everything is validated and
//! clamped here before a tool runs; failures surface as
//! `EngineError::InvalidArgument` and never panic past the executor
//! boundary.

use crate::error::EngineError;
use crate::Result;
use chrono::{Datelike, Months, NaiveDate};
use serde_json::Value;

/// Inclusive date window. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            // end date is inclusive
            if date > end {
                return false;
            }
        }
        true
    }
}

/// Grouping field accepted by breakdown/grouping tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Category,
    Subcategory,
    Merchant,
}

impl GroupField {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupField::Category => "category",
            GroupField::Subcategory => "subcategory",
            GroupField::Merchant => "merchant",
        }
    }
}

/// Integer argument with clamping. Missing -> default; wrong type is an
/// argument error.
pub fn int_arg(args: &Value, name: &str, default: i64, lo: i64, hi: i64) -> Result<i64> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => {
            let n = v
                .as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| EngineError::InvalidArgument(format!("{} must be an integer", name)))?;
            Ok(n.clamp(lo, hi))
        }
    }
}

/// Float argument with clamping.
pub fn float_arg(args: &Value, name: &str, default: f64, lo: f64, hi: f64) -> Result<f64> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => {
            let n = v
                .as_f64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| EngineError::InvalidArgument(format!("{} must be a number", name)))?;
            Ok(n.clamp(lo, hi))
        }
    }
}

/// Optional bounded string argument: trimmed and truncated, empty
/// collapses to None.
pub fn str_arg(args: &Value, name: &str, max_len: usize) -> Option<String> {
    let value = args.get(name)?.as_str()?.trim().to_string();
    if value.is_empty() {
        return None;
    }
    Some(value.chars().take(max_len).collect())
}

pub fn required_str_arg(args: &Value, name: &str, max_len: usize) -> Result<String> {
    str_arg(args, name, max_len)
        .ok_or_else(|| EngineError::InvalidArgument(format!("{} is required", name)))
}

/// Strict YYYY-MM-DD date field.
pub fn date_arg(args: &Value, name: &str) -> Result<Option<NaiveDate>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| EngineError::InvalidArgument(format!("{} must be a string", name)))?
                .trim();
            if s.is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| EngineError::InvalidArgument(format!("{} must be YYYY-MM-DD", name)))
        }
    }
}

pub fn group_field_arg(args: &Value, name: &str, default: GroupField) -> GroupField {
    match args.get(name).and_then(Value::as_str).map(str::trim) {
        Some("subcategory") | Some("2nd category") => GroupField::Subcategory,
        Some("merchant") => GroupField::Merchant,
        Some("category") => GroupField::Category,
        _ => default,
    }
}

/// Resolve the date window for a tool call. A relative `period` value,
/// when present and recognized, deterministically expands against
/// `today` and overrides any literal start/end dates.
pub fn date_range_arg(args: &Value, today: NaiveDate) -> Result<DateRange> {
    if let Some(period) = args.get("period").and_then(Value::as_str) {
        if let Some((start, end)) = expand_period(period.trim(), today) {
            return Ok(DateRange { start: Some(start), end: Some(end) });
        }
    }

    Ok(DateRange {
        start: date_arg(args, "start_date")?,
        end: date_arg(args, "end_date")?,
    })
}

fn month_start(d: NaiveDate) -> NaiveDate {
    // Day 1 always exists
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap()
}

/// Deterministic relative-period expansion. Unknown periods yield None
/// so callers can fall back to literal dates.
pub fn expand_period(period: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let days_back = |n: i64| (today - chrono::Duration::days(n - 1), today);

    match period {
        "last_7_days" => Some(days_back(7)),
        "last_30_days" => Some(days_back(30)),
        "last_90_days" => Some(days_back(90)),
        "this_month" => Some((month_start(today), today)),
        "last_month" => {
            let last_prev = month_start(today).pred_opt()?;
            Some((month_start(last_prev), last_prev))
        }
        "this_year" => Some((NaiveDate::from_ymd_opt(today.year(), 1, 1)?, today)),
        "last_year" => Some((
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)?,
            NaiveDate::from_ymd_opt(today.year() - 1, 12, 31)?,
        )),
        _ => None,
    }
}

/// Trailing month window ending at the newest record, used by
/// recurring/trend tools.
pub fn months_back(anchor: NaiveDate, months: u32) -> NaiveDate {
    anchor
        .checked_sub_months(Months::new(months))
        .unwrap_or(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_int_arg_clamps() {
        let args = json!({ "n": 500 });
        assert_eq!(int_arg(&args, "n", 10, 1, 50).unwrap(), 50);
        assert_eq!(int_arg(&json!({}), "n", 10, 1, 50).unwrap(), 10);
    }

    #[test]
    fn test_int_arg_rejects_wrong_type() {
        let args = json!({ "n": [1, 2] });
        assert!(matches!(
            int_arg(&args, "n", 10, 1, 50),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_required_str_missing() {
        assert!(required_str_arg(&json!({}), "merchant_substr", 60).is_err());
        assert!(required_str_arg(&json!({ "merchant_substr": "  " }), "merchant_substr", 60).is_err());
    }

    #[test]
    fn test_date_arg_strict_format() {
        assert!(date_arg(&json!({ "start_date": "01/02/2025" }), "start_date").is_err());
        assert_eq!(
            date_arg(&json!({ "start_date": "2025-02-01" }), "start_date").unwrap(),
            Some(day("2025-02-01"))
        );
    }

    #[test]
    fn test_expand_period_last_month() {
        let (start, end) = expand_period("last_month", day("2025-03-15")).unwrap();
        assert_eq!(start, day("2025-02-01"));
        assert_eq!(end, day("2025-02-28"));
    }

    #[test]
    fn test_expand_period_last_7_days_inclusive() {
        let (start, end) = expand_period("last_7_days", day("2025-03-10")).unwrap();
        assert_eq!(start, day("2025-03-04"));
        assert_eq!(end, day("2025-03-10"));
    }

    #[test]
    fn test_expand_period_unknown() {
        assert!(expand_period("fortnight", day("2025-03-10")).is_none());
    }

    #[test]
    fn test_period_overrides_literal_dates() {
        let args = json!({
            "period": "this_year",
            "start_date": "2020-01-01",
            "end_date": "2020-12-31"
        });
        let range = date_range_arg(&args, day("2025-06-01")).unwrap();
        assert_eq!(range.start, Some(day("2025-01-01")));
        assert_eq!(range.end, Some(day("2025-06-01")));
    }

    #[test]
    fn test_date_range_contains_inclusive_end() {
        let range = DateRange {
            start: Some(day("2025-01-01")),
            end: Some(day("2025-01-31")),
        };
        assert!(range.contains(day("2025-01-31")));
        assert!(!range.contains(day("2025-02-01")));
    }
}
