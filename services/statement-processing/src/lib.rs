//! Fintrack Statement Processing
//!
//! Turns uploaded bank-statement PDFs into normalized transactions. Model
//! extraction is preferred when a credential is configured; a regex pass
//! covers everything else.

pub mod ai_extractor;
pub mod extraction;
pub mod handlers;
pub mod llm_client;
pub mod metrics;
pub mod normalize;
pub mod pattern_extractor;
pub mod pdf_processor;
pub mod statement_validator;
pub mod uploads;

pub use ai_extractor::{AiExtraction, AiExtractor, AiExtractorSettings};
pub use extraction::{BatchExtraction, FileError, StatementExtractor};
pub use handlers::{create_router, AppState};
pub use llm_client::{ChatCompletion, CompletionOptions, OpenAiClient};
pub use metrics::{ExtractionMetrics, FileOutcome};
pub use pattern_extractor::{categorize, Categorization, PatternExtractor};
pub use pdf_processor::{PdfContent, PdfMetadata, PdfProcessor, PdfTextSource};
pub use statement_validator::StatementValidator;
pub use uploads::{SweepReport, UploadStore};
