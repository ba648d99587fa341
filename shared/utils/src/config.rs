use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use validator::Validate;

use crate::error::{FintrackError, FintrackResult};
use crate::validation::validate_model;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate]
    pub server: ServerConfig,
    #[validate]
    pub llm: LlmConfig,
    #[validate]
    pub extraction: ExtractionConfig,
    #[validate]
    pub rate_limits: RateLimitConfig,
    #[validate]
    pub uploads: UploadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1024))]
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmConfig {
    #[validate(length(min = 1))]
    pub api_url: String,
    /// AI extraction is skipped entirely when this is unset or blank.
    pub api_key: Option<String>,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtractionConfig {
    #[validate(range(min = 100))]
    pub chunk_size: usize,
    #[validate(range(min = 100))]
    pub format_sample_chars: usize,
    pub inter_chunk_delay_ms: u64,
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub min_statement_chars: usize,
    #[validate(range(min = 1))]
    pub min_keyword_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[validate(range(min = 1))]
    pub pdf_processing_limit: u32,
    #[validate(range(min = 1))]
    pub pdf_processing_window_ms: u64,
    #[validate(range(min = 1))]
    pub batch_check_limit: u32,
    #[validate(range(min = 1))]
    pub batch_check_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadConfig {
    #[validate(length(min = 1))]
    pub dir: String,
    #[validate(range(min = 1))]
    pub max_age_seconds: u64,
    #[validate(range(min = 1))]
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                File::with_name(&format!(
                    "config/{}",
                    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            // Add local config (gitignored)
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("FINTRACK").separator("__"));

        config.build()?.try_deserialize()
    }

    /// Run the declarative range checks over every section.
    pub fn validate_all(&self) -> FintrackResult<()> {
        validate_model(self).map_err(|e| FintrackError::configuration(e.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8084,
                max_request_size: 25 * 1024 * 1024, // 25MB
            },
            llm: LlmConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                max_tokens: 4096,
                temperature: 0.1,
                timeout_seconds: 60,
            },
            extraction: ExtractionConfig {
                chunk_size: 3000,
                format_sample_chars: 3000,
                inter_chunk_delay_ms: 10_000,
                max_attempts: 3,
                base_backoff_ms: 2000,
                min_statement_chars: 100,
                min_keyword_matches: 3,
            },
            rate_limits: RateLimitConfig {
                pdf_processing_limit: 10,
                pdf_processing_window_ms: 60 * 60 * 1000, // 1 hour
                batch_check_limit: 10,
                batch_check_window_ms: 60 * 60 * 1000,
            },
            uploads: UploadConfig {
                dir: "uploads".to_string(),
                max_age_seconds: 60 * 60,
                sweep_interval_seconds: 24 * 60 * 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate_all().is_ok());
        assert_eq!(config.extraction.chunk_size, 3000);
        assert_eq!(config.extraction.max_attempts, 3);
        assert_eq!(config.uploads.max_age_seconds, 3600);
    }

    #[test]
    fn test_out_of_range_attempts_rejected() {
        let mut config = AppConfig::default();
        config.extraction.max_attempts = 0;
        let err = config.validate_all().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_blank_api_key_is_not_a_credential() {
        let mut config = AppConfig::default();
        assert!(config.llm.credential().is_none());

        config.llm.api_key = Some("   ".to_string());
        assert!(config.llm.credential().is_none());

        config.llm.api_key = Some("sk-test".to_string());
        assert_eq!(config.llm.credential(), Some("sk-test"));
    }
}
