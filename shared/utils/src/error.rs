use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FintrackError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Statement processing error: {message}")]
    StatementProcessing { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        key: String,
        remaining: u32,
        limit: u32,
    },

    #[error("Insufficient quota: {message}")]
    QuotaInsufficient {
        message: String,
        required: u32,
        remaining: u32,
    },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl FintrackError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn statement_processing(message: impl Into<String>) -> Self {
        Self::StatementProcessing {
            message: message.into(),
        }
    }

    pub fn rate_limit(key: impl Into<String>, remaining: u32, limit: u32) -> Self {
        Self::RateLimit {
            message: "AI processing limit reached. Please try again later.".to_string(),
            key: key.into(),
            remaining,
            limit,
        }
    }

    pub fn quota_insufficient(required: u32, remaining: u32) -> Self {
        Self::QuotaInsufficient {
            message: format!(
                "Processing these files needs {} units of quota but only {} remain. Please try again later or upload fewer files.",
                required, remaining
            ),
            required,
            remaining,
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Quota errors are the only ones callers should surface as "try later".
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimit { .. } | Self::QuotaInsufficient { .. })
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::StatementProcessing { .. } => "STATEMENT_PROCESSING_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT_EXCEEDED",
            Self::QuotaInsufficient { .. } => "QUOTA_INSUFFICIENT",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::StatementProcessing { .. } => 422,
            Self::RateLimit { .. } => 429,
            Self::QuotaInsufficient { .. } => 429,
            Self::ExternalService { .. } => 502,
            Self::Configuration { .. } => 500,
            Self::Io { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::RateLimit {
                key,
                remaining,
                limit,
                ..
            } => Some(serde_json::json!({
                "key": key,
                "remaining": remaining,
                "limit": limit,
            })),
            Self::QuotaInsufficient {
                required,
                remaining,
                ..
            } => Some(serde_json::json!({
                "required": required,
                "remaining": remaining,
            })),
            Self::Validation { field, .. } => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }
}

pub type FintrackResult<T> = Result<T, FintrackError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl From<FintrackError> for ErrorResponse {
    fn from(error: FintrackError) -> Self {
        let message = match &error {
            FintrackError::RateLimit { message, .. }
            | FintrackError::QuotaInsufficient { message, .. } => message.clone(),
            other => other.to_string(),
        };

        Self {
            error: error.to_string(),
            code: error.error_code().to_string(),
            message,
            details: error.details(),
        }
    }
}

// Conversion from common error types
impl From<reqwest::Error> for FintrackError {
    fn from(error: reqwest::Error) -> Self {
        Self::external_service("HTTP Client", error.to_string())
    }
}

impl From<serde_json::Error> for FintrackError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation("JSON", error.to_string())
    }
}

impl From<std::io::Error> for FintrackError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (FintrackError::validation("file", "bad"), "VALIDATION_ERROR", 400),
            (FintrackError::statement_processing("x"), "STATEMENT_PROCESSING_ERROR", 422),
            (FintrackError::rate_limit("PDF_PROCESSING", 0, 5), "RATE_LIMIT_EXCEEDED", 429),
            (FintrackError::quota_insufficient(3, 1), "QUOTA_INSUFFICIENT", 429),
            (FintrackError::external_service("LLM", "down"), "EXTERNAL_SERVICE_ERROR", 502),
            (FintrackError::io("disk"), "IO_ERROR", 500),
        ];
        for (error, code, status) in cases {
            assert_eq!(error.error_code(), code);
            assert_eq!(error.http_status_code(), status);
        }
    }

    #[test]
    fn test_quota_errors_keep_user_message() {
        let response = ErrorResponse::from(FintrackError::quota_insufficient(3, 1));
        assert_eq!(response.code, "QUOTA_INSUFFICIENT");
        assert!(response.message.starts_with("Processing these files needs 3 units"));
        assert_eq!(response.details.unwrap()["remaining"], 1);
    }
}
