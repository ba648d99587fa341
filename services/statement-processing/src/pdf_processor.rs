//! PDF Processor
//!
//! Pulls plain text and basic document info out of statement PDFs.

use async_trait::async_trait;
use fintrack_utils::{FintrackError, FintrackResult};
use tracing::debug;

/// Text and metadata pulled from a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfContent {
    pub text: String,
    pub page_count: usize,
    pub metadata: PdfMetadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub producer: Option<String>,
    pub byte_len: usize,
}

/// Anything that can turn uploaded bytes into statement text.
#[async_trait]
pub trait PdfTextSource: Send + Sync {
    async fn extract(&self, data: Vec<u8>) -> FintrackResult<PdfContent>;
}

/// PDF processor backed by `pdf-extract` for text and `lopdf` for structure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfProcessor;

impl PdfProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extract content from PDF bytes on the current thread.
    pub fn extract_blocking(&self, data: &[u8]) -> FintrackResult<PdfContent> {
        // pdf-extract panics on some malformed fonts instead of erroring
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data))
            .map_err(|_| FintrackError::statement_processing("PDF text extractor panicked"))?
            .map_err(|e| {
                FintrackError::statement_processing(format!("Failed to extract text from PDF: {}", e))
            })?;

        let (page_count, title, producer) = read_structure(data);

        Ok(PdfContent {
            text,
            page_count,
            metadata: PdfMetadata {
                title,
                producer,
                byte_len: data.len(),
            },
        })
    }
}

#[async_trait]
impl PdfTextSource for PdfProcessor {
    async fn extract(&self, data: Vec<u8>) -> FintrackResult<PdfContent> {
        let processor = *self;
        tokio::task::spawn_blocking(move || processor.extract_blocking(&data))
            .await
            .map_err(|e| FintrackError::internal(format!("PDF extraction task failed: {}", e)))?
    }
}

/// Page count plus Title/Producer from the info dictionary, when readable.
fn read_structure(data: &[u8]) -> (usize, Option<String>, Option<String>) {
    let doc = match lopdf::Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Could not read PDF structure");
            return (0, None, None);
        }
    };

    let info = doc
        .trailer
        .get(&b"Info"[..])
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|id| doc.get_dictionary(id).ok());

    let field = |key: &[u8]| {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|obj| obj.as_str().ok())
            .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
            .filter(|value| !value.is_empty())
    };

    (doc.get_pages().len(), field(&b"Title"[..]), field(&b"Producer"[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let processor = PdfProcessor::new();
        let err = processor.extract_blocking(b"definitely not a pdf").unwrap_err();
        assert_eq!(err.error_code(), "STATEMENT_PROCESSING_ERROR");
    }

    #[test]
    fn test_structure_of_garbage_is_empty() {
        assert_eq!(read_structure(b"%PDF-garbage"), (0, None, None));
    }

    #[tokio::test]
    async fn test_async_extract_propagates_errors() {
        let processor = PdfProcessor::new();
        assert!(processor.extract(b"nope".to_vec()).await.is_err());
    }
}
