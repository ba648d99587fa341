//! Statement Validator
//!
//! Cheap keyword screen run before any extraction work. The threshold is
//! low on purpose; anything plausible passes.

const STATEMENT_KEYWORDS: &[&str] = &[
    "statement",
    "account",
    "balance",
    "transaction",
    "deposit",
    "withdrawal",
    "payment",
    "transfer",
    "credit",
    "debit",
    "beginning balance",
    "ending balance",
    "date",
    "description",
    "amount",
];

#[derive(Debug, Clone)]
pub struct StatementValidator {
    min_chars: usize,
    min_keyword_matches: usize,
}

impl Default for StatementValidator {
    fn default() -> Self {
        Self {
            min_chars: 100,
            min_keyword_matches: 3,
        }
    }
}

impl StatementValidator {
    pub fn new(min_chars: usize, min_keyword_matches: usize) -> Self {
        Self {
            min_chars,
            min_keyword_matches,
        }
    }

    pub fn looks_like_bank_statement(&self, text: &str) -> bool {
        if text.trim().is_empty() || text.chars().count() < self.min_chars {
            return false;
        }

        self.keyword_matches(text) >= self.min_keyword_matches
    }

    /// Number of distinct statement keywords present, case-insensitively.
    pub fn keyword_matches(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        STATEMENT_KEYWORDS
            .iter()
            .filter(|keyword| lowered.contains(*keyword))
            .count()
    }
}
