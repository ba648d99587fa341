//! Prometheus counters for the ingestion pipeline.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// How a single file left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Ai,
    Pattern,
    Rejected,
    Failed,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Pattern => "pattern",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct ExtractionMetrics {
    registry: Registry,
    files_processed: IntCounterVec,
    chunks_failed: IntCounter,
    records_dropped: IntCounter,
    rate_limited: IntCounter,
}

impl ExtractionMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let files_processed = IntCounterVec::new(
            Opts::new("fintrack_statement_files_total", "Statement files processed, by outcome"),
            &["outcome"],
        )
        .expect("valid metric definition");
        let chunks_failed = IntCounter::new(
            "fintrack_statement_chunks_failed_total",
            "Statement chunks dropped after exhausting retries",
        )
        .expect("valid metric definition");
        let records_dropped = IntCounter::new(
            "fintrack_statement_records_dropped_total",
            "Extracted records discarded as malformed",
        )
        .expect("valid metric definition");
        let rate_limited = IntCounter::new(
            "fintrack_statement_rate_limited_total",
            "AI extraction attempts denied by the rate limiter",
        )
        .expect("valid metric definition");

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(files_processed.clone()),
            Box::new(chunks_failed.clone()),
            Box::new(records_dropped.clone()),
            Box::new(rate_limited.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric names are unique");
        }

        Self {
            registry,
            files_processed,
            chunks_failed,
            records_dropped,
            rate_limited,
        }
    }

    pub fn record_file(&self, outcome: FileOutcome) {
        self.files_processed
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_chunk_failure(&self) {
        self.chunks_failed.inc();
    }

    pub fn record_dropped(&self, count: usize) {
        self.records_dropped.inc_by(count as u64);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    pub fn files(&self, outcome: FileOutcome) -> u64 {
        self.files_processed
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    pub fn chunks_failed(&self) -> u64 {
        self.chunks_failed.get()
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ExtractionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
