//! Pattern Extractor
//!
//! Regex fallback used when model extraction is unavailable or comes back
//! empty. Layouts the templates don't cover yield nothing.

use fintrack_models::{ExtractedTransaction, ExtractionSource, TransactionCategory};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::{parse_amount, parse_statement_date};

/// Keyword table scanned in order; the first hit decides the category.
const CATEGORY_KEYWORDS: &[(TransactionCategory, &[&str])] = &[
    (
        TransactionCategory::FoodAndDining,
        &[
            "starbucks", "mcdonald", "chipotle", "subway", "dunkin", "doordash", "uber eats",
            "ubereats", "grubhub", "postmates", "restaurant", "cafe", "coffee", "pizza",
            "burger", "taco bell", "wendy", "chick-fil-a", "panera", "domino", "kfc",
            "bakery", "whole foods", "trader joe", "kroger", "safeway",
        ],
    ),
    (
        TransactionCategory::Transportation,
        &[
            "uber", "lyft", "shell", "chevron", "exxon", "mobil", "gas station", "fuel",
            "parking", "metro", "transit", "airline", "delta air", "united air",
            "american air", "southwest", "amtrak", "toll",
        ],
    ),
    (
        TransactionCategory::HousingAndUtilities,
        &[
            "rent", "mortgage", "electric", "water bill", "utility", "utilities", "comcast",
            "xfinity", "verizon", "at&t", "t-mobile", "spectrum", "pg&e", "internet",
        ],
    ),
    (
        TransactionCategory::Entertainment,
        &[
            "netflix", "spotify", "hulu", "disney+", "disney plus", "hbo", "youtube",
            "apple music", "amc", "cinema", "theater", "theatre", "steam", "playstation",
            "xbox", "ticketmaster",
        ],
    ),
    (
        TransactionCategory::Shopping,
        &[
            "amazon", "walmart", "target", "costco", "best buy", "ebay", "etsy", "home depot",
            "ikea", "macy", "nordstrom", "apple store",
        ],
    ),
    (
        TransactionCategory::HealthAndFitness,
        &[
            "cvs", "walgreens", "pharmacy", "rite aid", "clinic", "hospital", "dental",
            "doctor", "medical", "gym", "fitness", "peloton",
        ],
    ),
    (
        TransactionCategory::Income,
        &["payroll", "direct deposit", "salary", "deposit", "interest paid"],
    ),
];

/// Keyword hits this close to the start of a description also set the merchant.
const MERCHANT_PREFIX_CHARS: usize = 10;

/// Summary rows that share the transaction layout but are not transactions.
const SUMMARY_MARKER: &str = "balance";

struct KeywordMatcher {
    category: TransactionCategory,
    regex: Regex,
}

fn keyword_matchers() -> &'static [KeywordMatcher] {
    static MATCHERS: OnceLock<Vec<KeywordMatcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        CATEGORY_KEYWORDS
            .iter()
            .flat_map(|(category, keywords)| {
                keywords.iter().map(move |keyword| KeywordMatcher {
                    category: *category,
                    regex: Regex::new(&format!("(?i){}", regex::escape(keyword)))
                        .expect("keyword regex"),
                })
            })
            .collect()
    })
}

/// Merchant label and category inferred from a transaction description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub merchant: String,
    pub category: TransactionCategory,
}

/// Infer merchant and category from free text. Pure function of its input.
pub fn categorize(description: &str) -> Categorization {
    let description = description.trim();
    let default_merchant = description
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");

    for matcher in keyword_matchers() {
        if let Some(hit) = matcher.regex.find(description) {
            let merchant = if description[..hit.start()].chars().count() < MERCHANT_PREFIX_CHARS {
                description[..hit.end()].trim().to_string()
            } else {
                default_merchant
            };
            return Categorization {
                merchant,
                category: matcher.category,
            };
        }
    }

    Categorization {
        merchant: default_merchant,
        category: TransactionCategory::Miscellaneous,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmountConvention {
    /// Signed as printed: withdrawals carry a minus.
    AsPrinted,
    /// Card statements print charges positive and credits negative.
    ChargesPositive,
}

struct StatementPattern {
    name: &'static str,
    regex: Regex,
    date_group: usize,
    description_group: usize,
    amount_group: usize,
    convention: AmountConvention,
}

/// Regex templates for common statement layouts, tried in order.
pub struct PatternExtractor {
    patterns: Vec<StatementPattern>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        let patterns = vec![
            // 03/14/2024  STARBUCKS #4521  -$6.75
            StatementPattern {
                name: "date-description-amount",
                regex: Regex::new(
                    r"(\d{1,2}/\d{1,2}/\d{2,4})[ \t]+([^\n]+?)[ \t]+(\(?-?\$?[ ]?-?[\d,]+\.\d{2}\)?)",
                )
                .expect("statement regex"),
                date_group: 1,
                description_group: 2,
                amount_group: 3,
                convention: AmountConvention::AsPrinted,
            },
            // 03/14  03/15  UBER TRIP HELP.UBER.COM  12.50
            StatementPattern {
                name: "card-posting",
                regex: Regex::new(
                    r"(\d{1,2}/\d{1,2})[ \t]+\d{1,2}/\d{1,2}[ \t]+([^\n]+?)[ \t]+(-?\$?-?[\d,]+\.\d{2})",
                )
                .expect("statement regex"),
                date_group: 1,
                description_group: 2,
                amount_group: 3,
                convention: AmountConvention::ChargesPositive,
            },
        ];

        Self { patterns }
    }

    /// Extract transactions with the first template that matches anything.
    pub fn extract(&self, text: &str, user_id: Uuid) -> Vec<ExtractedTransaction> {
        for pattern in &self.patterns {
            let captures: Vec<_> = pattern
                .regex
                .captures_iter(text)
                .filter(|caps| {
                    caps.get(pattern.description_group)
                        .is_some_and(|m| !m.as_str().to_lowercase().contains(SUMMARY_MARKER))
                })
                .collect();
            if captures.is_empty() {
                continue;
            }

            debug!(pattern = pattern.name, matches = captures.len(), "Statement pattern matched");

            return captures
                .iter()
                .filter_map(|caps| {
                    let raw_date = caps.get(pattern.date_group)?.as_str().trim();
                    let description = caps.get(pattern.description_group)?.as_str().trim();
                    let raw_amount = caps.get(pattern.amount_group)?.as_str();

                    let Some(amount) = parse_amount(raw_amount) else {
                        debug!(amount = raw_amount, "Skipping line with unparseable amount");
                        return None;
                    };
                    if amount == 0.0 {
                        debug!(description, "Skipping zero-amount line");
                        return None;
                    }
                    let amount = match pattern.convention {
                        AmountConvention::AsPrinted => amount,
                        AmountConvention::ChargesPositive => -amount,
                    };

                    let Categorization { merchant, category } = categorize(description);
                    let txn = ExtractedTransaction {
                        user_id,
                        date: parse_statement_date(raw_date),
                        raw_date: raw_date.to_string(),
                        merchant,
                        amount,
                        category,
                        description: description.to_string(),
                        source: ExtractionSource::Pattern,
                    };

                    if txn.is_well_formed() {
                        Some(txn)
                    } else {
                        debug!(description, "Dropping malformed pattern match");
                        None
                    }
                })
                .collect();
        }

        Vec::new()
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}
