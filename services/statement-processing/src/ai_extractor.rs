//! AI Extractor
//!
//! Two-pass model extraction. A format pass reads the top of the statement
//! and describes its layout; the extraction pass then walks the text in
//! fixed-size chunks, one at a time, with a pause between chunks and retries
//! per chunk. A chunk that keeps failing is dropped and the walk continues.

use fintrack_models::{ExtractedTransaction, ExtractionSource, StatementFormatProfile, TransactionCategory};
use fintrack_utils::{with_retry, AppConfig, FintrackError, FintrackResult, RateLimiter, RetryPolicy, PDF_PROCESSING};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm_client::{parse_json_payload, ChatCompletion, CompletionOptions};
use crate::metrics::ExtractionMetrics;
use crate::normalize::{amount_from_value, dedup_by_key, dedup_key, parse_statement_date, signed_amount};

/// Tunables for one extractor instance.
#[derive(Debug, Clone)]
pub struct AiExtractorSettings {
    pub chunk_chars: usize,
    pub format_sample_chars: usize,
    pub inter_chunk_delay: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub completion: CompletionOptions,
}

impl AiExtractorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chunk_chars: config.extraction.chunk_size,
            format_sample_chars: config.extraction.format_sample_chars,
            inter_chunk_delay: Duration::from_millis(config.extraction.inter_chunk_delay_ms),
            retry: RetryPolicy::new(
                config.extraction.max_attempts,
                Duration::from_millis(config.extraction.base_backoff_ms),
            ),
            rate_limit: config.rate_limits.pdf_processing_limit,
            rate_window: Duration::from_millis(config.rate_limits.pdf_processing_window_ms),
            completion: CompletionOptions::from_config(&config.llm),
        }
    }
}

impl Default for AiExtractorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of a model extraction over one document.
#[derive(Debug, Clone)]
pub struct AiExtraction {
    pub transactions: Vec<ExtractedTransaction>,
    pub profile: StatementFormatProfile,
    pub chunks_total: usize,
    pub chunks_failed: usize,
}

pub struct AiExtractor {
    llm: Arc<dyn ChatCompletion>,
    limiter: Arc<RateLimiter>,
    metrics: ExtractionMetrics,
    settings: AiExtractorSettings,
}

impl AiExtractor {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        limiter: Arc<RateLimiter>,
        metrics: ExtractionMetrics,
        settings: AiExtractorSettings,
    ) -> Self {
        Self {
            llm,
            limiter,
            metrics,
            settings,
        }
    }

    /// Extract transactions from statement text with the model.
    ///
    /// Fails with `RateLimit` before any call when the quota is spent, and
    /// with `StatementProcessing` when the format pass or every chunk fails.
    pub async fn extract(&self, text: &str, user_id: Uuid) -> FintrackResult<AiExtraction> {
        let limit = self.settings.rate_limit;
        if !self
            .limiter
            .can_proceed(PDF_PROCESSING, limit, self.settings.rate_window)
        {
            self.metrics.record_rate_limited();
            let remaining = self.limiter.remaining_quota(PDF_PROCESSING, limit);
            return Err(FintrackError::rate_limit(PDF_PROCESSING, remaining, limit));
        }

        let profile = self.detect_format(text).await?;
        let chunks = split_into_chunks(text, self.settings.chunk_chars);
        let chunks_total = chunks.len();
        if chunks_total == 0 {
            return Err(FintrackError::statement_processing("Statement text is empty"));
        }

        info!(
            %user_id,
            chunks = chunks_total,
            bank = profile.bank_name_or_default(),
            "Starting chunked statement extraction"
        );

        let mut candidates = Vec::new();
        let mut chunks_failed = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.settings.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_chunk_delay).await;
            }

            let prompt = chunk_prompt(&profile, chunk, index + 1, chunks_total);
            let result = with_retry(&self.settings.retry, "statement_chunk", |_| {
                self.extract_chunk(&prompt)
            })
            .await;

            match result {
                Ok(items) => {
                    debug!(chunk = index + 1, items = items.len(), "Chunk extracted");
                    candidates.extend(items);
                }
                Err(e) => {
                    chunks_failed += 1;
                    self.metrics.record_chunk_failure();
                    warn!(
                        chunk = index + 1,
                        of = chunks_total,
                        error = %e,
                        "Chunk failed after retries, continuing with next chunk"
                    );
                }
            }
        }

        if chunks_failed == chunks_total {
            return Err(FintrackError::statement_processing(format!(
                "All {} chunks failed extraction",
                chunks_total
            )));
        }

        let before = candidates.len();
        let candidates = dedup_by_key(candidates, |c: &Candidate| {
            dedup_key(&c.raw_date, c.amount, &c.merchant)
        });
        if candidates.len() < before {
            debug!(duplicates = before - candidates.len(), "Removed duplicate transactions");
        }

        let transactions: Vec<ExtractedTransaction> = candidates
            .into_iter()
            .map(|c| c.into_transaction(user_id))
            .filter(ExtractedTransaction::is_well_formed)
            .collect();

        info!(
            %user_id,
            transactions = transactions.len(),
            chunks_failed,
            "AI statement extraction finished"
        );

        Ok(AiExtraction {
            transactions,
            profile,
            chunks_total,
            chunks_failed,
        })
    }

    async fn detect_format(&self, text: &str) -> FintrackResult<StatementFormatProfile> {
        let prompt = format_prompt(take_chars(text, self.settings.format_sample_chars));

        let raw = with_retry(&self.settings.retry, "statement_format", |_| {
            self.llm.complete(&prompt, &self.settings.completion)
        })
        .await
        .map_err(|e| FintrackError::statement_processing(format!("Format detection failed: {}", e)))?;

        match parse_json_payload::<StatementFormatProfile>(&raw) {
            Ok(profile) => Ok(profile),
            Err(e) => {
                warn!(error = %e, "Unreadable format profile, continuing with unknown layout");
                Ok(StatementFormatProfile::unknown())
            }
        }
    }

    async fn extract_chunk(&self, prompt: &str) -> FintrackResult<Vec<Candidate>> {
        let raw = self.llm.complete(prompt, &self.settings.completion).await?;
        let payload: ChunkPayload = parse_json_payload(&raw)?;

        let items = payload.into_items();
        let total = items.len();
        let candidates: Vec<Candidate> = items.into_iter().filter_map(Candidate::from_value).collect();

        if candidates.len() < total {
            let dropped = total - candidates.len();
            self.metrics.record_dropped(dropped);
            debug!(dropped, "Dropped malformed transaction items");
        }

        Ok(candidates)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChunkPayload {
    Wrapped {
        #[serde(default)]
        transactions: Vec<Value>,
    },
    Bare(Vec<Value>),
}

impl ChunkPayload {
    fn into_items(self) -> Vec<Value> {
        match self {
            Self::Wrapped { transactions } => transactions,
            Self::Bare(items) => items,
        }
    }
}

/// Loose shape of one model-reported line item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "payee", alias = "description")]
    merchant: Option<String>,
    #[serde(default)]
    amount: Value,
    #[serde(default, alias = "is_deposit")]
    is_deposit: Option<bool>,
    #[serde(default)]
    category: Option<String>,
}

/// A validated line item awaiting de-duplication and normalization.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    raw_date: String,
    merchant: String,
    amount: f64,
    is_deposit: bool,
    category: String,
}

impl Candidate {
    fn from_value(value: Value) -> Option<Self> {
        let item: RawItem = serde_json::from_value(value).ok()?;
        let merchant = item.merchant?.trim().to_string();
        if merchant.is_empty() {
            return None;
        }
        let amount = amount_from_value(&item.amount).filter(|amount| *amount != 0.0)?;

        Some(Self {
            raw_date: item.date.unwrap_or_default().trim().to_string(),
            merchant,
            amount,
            is_deposit: item.is_deposit.unwrap_or(false),
            category: item.category.unwrap_or_default(),
        })
    }

    fn into_transaction(self, user_id: Uuid) -> ExtractedTransaction {
        ExtractedTransaction {
            user_id,
            date: parse_statement_date(&self.raw_date),
            raw_date: self.raw_date,
            description: self.merchant.clone(),
            merchant: self.merchant,
            amount: signed_amount(self.amount, self.is_deposit),
            category: TransactionCategory::from_label(&self.category),
            source: ExtractionSource::Ai,
        }
    }
}

/// Split text into chunks of at most `chunk_chars` characters, skipping
/// chunks that are only whitespace.
pub fn split_into_chunks(text: &str, chunk_chars: usize) -> Vec<&str> {
    let size = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (index, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn format_prompt(sample: &str) -> String {
    format!(
        r#"Analyze the beginning of this bank statement and describe its layout.

Return a JSON object with exactly these fields:
{{
  "bankName": "issuing bank or card issuer",
  "dateFormat": "how transaction dates are written, e.g. MM/DD/YYYY",
  "transactionStructure": "how a single transaction entry is laid out",
  "amountFormat": "how amounts are written, including currency symbols and separators",
  "depositConvention": "how deposits are distinguished from withdrawals"
}}

Statement text:
{}"#,
        sample
    )
}

fn chunk_prompt(profile: &StatementFormatProfile, chunk: &str, part: usize, parts: usize) -> String {
    let categories = TransactionCategory::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Extract every transaction from part {part} of {parts} of a bank statement.

Statement format:
- Bank: {bank}
- Date format: {date_format}
- Transaction structure: {structure}
- Amount format: {amount_format}
- Deposits vs withdrawals: {deposits}

Return a JSON object of the form:
{{"transactions": [{{"date": "date as written", "merchant": "short payee name", "amount": 12.34, "isDeposit": false, "category": "one of the categories"}}]}}

Rules:
- "amount" is a bare positive number with no currency symbol or sign.
- "isDeposit" is true for deposits, credits and income, false for purchases, fees and withdrawals.
- "category" must be one of: {categories}.
- Skip balance lines, totals and headers.
- If there are no transactions, return {{"transactions": []}}.

Statement text:
{chunk}"#,
        bank = profile.bank_name_or_default(),
        date_format = profile.date_format_or_default(),
        structure = profile.transaction_structure_or_default(),
        amount_format = profile.amount_format_or_default(),
        deposits = profile.deposit_convention_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_into_chunks() {
        assert_eq!(split_into_chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_into_chunks("abc", 3), vec!["abc"]);
        assert!(split_into_chunks("", 3).is_empty());
        assert_eq!(split_into_chunks("ab   ", 2), vec!["ab"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let chunks = split_into_chunks("€€€€€", 2);
        assert_eq!(chunks, vec!["€€", "€€", "€"]);
    }

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("hello", 3), "hel");
        assert_eq!(take_chars("hi", 3), "hi");
        assert_eq!(take_chars("été", 2), "ét");
    }

    #[test]
    fn test_candidate_parsing() {
        let candidate = Candidate::from_value(json!({
            "date": "03/14/2024",
            "merchant": " Uber ",
            "amount": "12.50",
            "isDeposit": false,
            "category": "Transportation"
        }))
        .unwrap();
        assert_eq!(candidate.merchant, "Uber");
        assert_eq!(candidate.amount, 12.5);

        let txn = candidate.into_transaction(Uuid::nil());
        assert_eq!(txn.amount, -12.5);
        assert_eq!(txn.category, TransactionCategory::Transportation);
        assert_eq!(txn.source, ExtractionSource::Ai);
    }

    #[test]
    fn test_candidate_rejects_malformed_items() {
        assert!(Candidate::from_value(json!({"merchant": "X", "amount": "abc"})).is_none());
        assert!(Candidate::from_value(json!({"merchant": "  ", "amount": 1})).is_none());
        assert!(Candidate::from_value(json!({"amount": 1})).is_none());
        assert!(Candidate::from_value(json!("not an object")).is_none());
        assert!(Candidate::from_value(json!({"merchant": "X", "amount": 1, "date": 5})).is_none());
        assert!(Candidate::from_value(json!({"merchant": "X", "amount": 0, "isDeposit": true})).is_none());
        assert!(Candidate::from_value(json!({"merchant": "X", "amount": "$0.00"})).is_none());
    }

    #[test]
    fn test_deposit_flag_sets_sign() {
        let deposit = Candidate::from_value(json!({
            "merchant": "Payroll", "amount": 1500, "isDeposit": true, "category": "Salary"
        }))
        .unwrap()
        .into_transaction(Uuid::nil());
        assert_eq!(deposit.amount, 1500.0);
        assert_eq!(deposit.category, TransactionCategory::Income);
    }

    #[test]
    fn test_chunk_payload_shapes() {
        let wrapped: ChunkPayload = serde_json::from_value(json!({"transactions": [{}]})).unwrap();
        assert_eq!(wrapped.into_items().len(), 1);

        let bare: ChunkPayload = serde_json::from_value(json!([{}, {}])).unwrap();
        assert_eq!(bare.into_items().len(), 2);

        let empty: ChunkPayload = serde_json::from_value(json!({})).unwrap();
        assert!(empty.into_items().is_empty());
    }

    #[test]
    fn test_chunk_prompt_uses_profile_defaults() {
        let prompt = chunk_prompt(&StatementFormatProfile::unknown(), "BODY", 1, 2);
        assert!(prompt.contains("Bank: Unknown"));
        assert!(prompt.contains("Date format: Various formats"));
        assert!(prompt.contains("part 1 of 2"));
        assert!(prompt.contains("Health & Fitness"));
        assert!(prompt.ends_with("BODY"));
    }
}
