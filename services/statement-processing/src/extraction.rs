//! Statement Extraction Service
//!
//! Orchestrates one upload end to end: read, extract text, screen, try the
//! model, fall back to patterns, clean up. Batches run files concurrently
//! after a quota precheck.

use fintrack_models::ExtractedTransaction;
use fintrack_utils::{AppConfig, FintrackError, FintrackResult, RateLimiter, PDF_PROCESSING_CHECK};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ai_extractor::{AiExtractor, AiExtractorSettings};
use crate::llm_client::ChatCompletion;
use crate::metrics::{ExtractionMetrics, FileOutcome};
use crate::pattern_extractor::PatternExtractor;
use crate::pdf_processor::PdfTextSource;
use crate::statement_validator::StatementValidator;
use crate::uploads::UploadStore;

/// A file in a batch that produced no result.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

/// Combined result of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchExtraction {
    pub transactions: Vec<ExtractedTransaction>,
    pub files_processed: usize,
    pub errors: Vec<FileError>,
}

/// Statement extractor service
#[derive(Clone)]
pub struct StatementExtractor {
    pdf: Arc<dyn PdfTextSource>,
    ai: Option<Arc<AiExtractor>>,
    patterns: Arc<PatternExtractor>,
    validator: StatementValidator,
    limiter: Arc<RateLimiter>,
    uploads: Arc<UploadStore>,
    metrics: ExtractionMetrics,
    batch_limit: u32,
    batch_window: Duration,
}

impl StatementExtractor {
    /// Build the pipeline from configuration. `llm` is `None` when no model
    /// credential is configured, which leaves only the pattern path.
    pub fn from_config(
        config: &AppConfig,
        pdf: Arc<dyn PdfTextSource>,
        llm: Option<Arc<dyn ChatCompletion>>,
        limiter: Arc<RateLimiter>,
        uploads: Arc<UploadStore>,
        metrics: ExtractionMetrics,
    ) -> Self {
        let ai = llm.map(|llm| {
            Arc::new(AiExtractor::new(
                llm,
                limiter.clone(),
                metrics.clone(),
                AiExtractorSettings::from_config(config),
            ))
        });

        Self {
            pdf,
            ai,
            patterns: Arc::new(PatternExtractor::new()),
            validator: StatementValidator::new(
                config.extraction.min_statement_chars,
                config.extraction.min_keyword_matches,
            ),
            limiter,
            uploads,
            metrics,
            batch_limit: config.rate_limits.batch_check_limit,
            batch_window: Duration::from_millis(config.rate_limits.batch_check_window_ms),
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    pub fn batch_limit(&self) -> u32 {
        self.batch_limit
    }

    /// Process one stored upload.
    ///
    /// Returns `None` when the text does not look like a bank statement and
    /// an empty list when nothing could be extracted. The file is deleted
    /// before returning, whatever the outcome.
    pub async fn extract_from_file(
        &self,
        path: &Path,
        user_id: Uuid,
    ) -> FintrackResult<Option<Vec<ExtractedTransaction>>> {
        let result = self.process_file(path, user_id).await;

        if let Err(e) = &result {
            self.metrics.record_file(FileOutcome::Failed);
            error!(path = %path.display(), %user_id, error = %e, "Statement extraction failed");
        }

        self.uploads.remove(path).await;
        self.uploads.sweep_stale().await;

        result
    }

    async fn process_file(
        &self,
        path: &Path,
        user_id: Uuid,
    ) -> FintrackResult<Option<Vec<ExtractedTransaction>>> {
        let data = tokio::fs::read(path).await?;
        let content = self.pdf.extract(data).await?;

        if !self.validator.looks_like_bank_statement(&content.text) {
            self.metrics.record_file(FileOutcome::Rejected);
            info!(
                path = %path.display(),
                chars = content.text.chars().count(),
                "Upload does not look like a bank statement"
            );
            return Ok(None);
        }

        if let Some(ai) = &self.ai {
            match ai.extract(&content.text, user_id).await {
                Ok(extraction) if !extraction.transactions.is_empty() => {
                    self.metrics.record_file(FileOutcome::Ai);
                    return Ok(Some(extraction.transactions));
                }
                Ok(_) => info!(%user_id, "AI extraction found nothing, trying patterns"),
                Err(e) => warn!(%user_id, error = %e, "AI extraction failed, trying patterns"),
            }
        }

        let transactions = self.patterns.extract(&content.text, user_id);
        self.metrics.record_file(FileOutcome::Pattern);
        info!(
            %user_id,
            pages = content.page_count,
            transactions = transactions.len(),
            "Pattern extraction finished"
        );

        Ok(Some(transactions))
    }

    /// Process several uploads concurrently.
    ///
    /// Multi-file batches first reserve `ceil(n/2)` units of the batch quota;
    /// when that is not available the call fails before any file is read and
    /// leaves every file in place.
    pub async fn extract_from_files(
        &self,
        paths: Vec<PathBuf>,
        user_id: Uuid,
    ) -> FintrackResult<BatchExtraction> {
        if paths.len() > 1 {
            self.reserve_batch_quota(paths.len())?;
        }

        let mut tasks = JoinSet::new();
        for path in paths {
            let extractor = self.clone();
            tasks.spawn(async move {
                let result = extractor.extract_from_file(&path, user_id).await;
                (path, result)
            });
        }

        let mut batch = BatchExtraction::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(transactions)))) => {
                    batch.files_processed += 1;
                    batch.transactions.extend(transactions);
                }
                Ok((path, Ok(None))) => {
                    batch.files_processed += 1;
                    batch.errors.push(FileError {
                        file: path.display().to_string(),
                        message: "File does not appear to be a bank statement".to_string(),
                    });
                }
                Ok((path, Err(e))) => batch.errors.push(FileError {
                    file: path.display().to_string(),
                    message: e.to_string(),
                }),
                Err(e) => {
                    // The upload is left for the periodic sweep
                    error!(error = %e, "Statement worker task failed");
                    batch.errors.push(FileError {
                        file: "unknown".to_string(),
                        message: "worker task failed".to_string(),
                    });
                }
            }
        }

        info!(
            %user_id,
            files = batch.files_processed,
            transactions = batch.transactions.len(),
            errors = batch.errors.len(),
            "Batch extraction finished"
        );

        Ok(batch)
    }

    fn reserve_batch_quota(&self, file_count: usize) -> FintrackResult<()> {
        let required = u32::try_from(file_count.div_ceil(2)).unwrap_or(u32::MAX);
        let remaining = self
            .limiter
            .remaining_quota(PDF_PROCESSING_CHECK, self.batch_limit);

        if remaining < required
            || !self.limiter.try_acquire(
                PDF_PROCESSING_CHECK,
                self.batch_limit,
                self.batch_window,
                required,
            )
        {
            self.metrics.record_rate_limited();
            warn!(file_count, required, remaining, "Batch rejected for insufficient quota");
            return Err(FintrackError::quota_insufficient(required, remaining));
        }

        Ok(())
    }
}
