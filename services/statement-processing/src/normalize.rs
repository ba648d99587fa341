//! Normalization helpers shared by both extraction paths.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::OnceLock;

struct DatePatterns {
    us_short: Regex,
    us_long: Regex,
    dashed_day_first: Regex,
    iso: Regex,
}

fn date_patterns() -> &'static DatePatterns {
    static PATTERNS: OnceLock<DatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DatePatterns {
        us_short: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").expect("valid regex"),
        us_long: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"),
        dashed_day_first: Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").expect("valid regex"),
        iso: Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid regex"),
    })
}

/// Formats tried after the fixed layouts, in order.
const FALLBACK_FORMATS: &[&str] = &[
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%m.%d.%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%b. %d, %Y",
];

/// Two-digit years pivot at 50: `24` is 2024, `87` is 1987.
pub fn expand_two_digit_year(year: i32) -> i32 {
    if year < 50 {
        2000 + year
    } else {
        1900 + year
    }
}

/// Parse a date as it appears on a statement.
///
/// Tries MM/DD/YY, MM/DD/YYYY, DD-MM-YYYY, YYYY-MM-DD, then a set of
/// spelled-out and alternative layouts. Returns `None` rather than guessing.
pub fn parse_statement_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let patterns = date_patterns();

    let fixed = [
        (&patterns.us_short, DateOrder::MonthDayShortYear),
        (&patterns.us_long, DateOrder::MonthDayYear),
        (&patterns.dashed_day_first, DateOrder::DayMonthYear),
        (&patterns.iso, DateOrder::YearMonthDay),
    ];

    for (regex, order) in fixed {
        let Some(caps) = regex.captures(value) else {
            continue;
        };
        let parts: Vec<i32> = (1..=3)
            .filter_map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
            .collect();
        if parts.len() != 3 {
            continue;
        }
        if let Some(date) = order.build(parts[0], parts[1], parts[2]) {
            return Some(date);
        }
    }

    parse_generic_date(value)
}

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    MonthDayShortYear,
    MonthDayYear,
    DayMonthYear,
    YearMonthDay,
}

impl DateOrder {
    fn build(self, a: i32, b: i32, c: i32) -> Option<NaiveDate> {
        let (year, month, day) = match self {
            Self::MonthDayShortYear => (expand_two_digit_year(c), a, b),
            Self::MonthDayYear => (c, a, b),
            Self::DayMonthYear => (c, b, a),
            Self::YearMonthDay => (a, b, c),
        };
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    }
}

fn parse_generic_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }

    FALLBACK_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Parse a statement amount such as `-$1,234.56`, `$6.75`, `(42.00)` or `12.50-`.
///
/// Parentheses and a leading or trailing minus mark negatives. Returns `None`
/// for anything that is not a finite number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut value = raw.trim();
    let mut negative = false;

    if value.starts_with('(') && value.ends_with(')') && value.len() >= 2 {
        negative = true;
        value = &value[1..value.len() - 1];
    }

    let mut cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();

    if cleaned.ends_with('-') {
        negative = !negative;
        cleaned.pop();
    }
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let parsed: f64 = cleaned.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }

    Some(if negative { -parsed } else { parsed })
}

/// Read an amount that a model may have sent as a number or a string.
pub fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Deposits are positive, everything else negative.
pub fn signed_amount(amount: f64, is_deposit: bool) -> f64 {
    if is_deposit {
        amount.abs()
    } else {
        -amount.abs()
    }
}

/// Exact-match identity used to drop repeated line items.
pub fn dedup_key(date: &str, amount: f64, merchant: &str) -> (String, u64, String) {
    (date.to_string(), amount.to_bits(), merchant.to_string())
}

/// Keep the first item for each key, preserving order.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}
