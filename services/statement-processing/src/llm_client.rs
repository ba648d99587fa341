//! LLM Client
//!
//! Chat-completion access for statement extraction. Integrates with OpenAI
//! or any endpoint speaking the same `/chat/completions` protocol.

use async_trait::async_trait;
use fintrack_utils::{FintrackError, FintrackResult, LlmConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
}

impl CompletionOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_response: true,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::from_config(&fintrack_utils::AppConfig::default().llm)
    }
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send one prompt and return the raw text of the first choice.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> FintrackResult<String>;
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> FintrackResult<Self> {
        let api_key = config
            .credential()
            .ok_or_else(|| FintrackError::configuration("LLM API key is not configured"))?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> FintrackResult<String> {
        let request = ChatRequest {
            model: &options.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: options.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FintrackError::external_service(
                "LLM",
                format!("{}: {}", status, error_text),
            ));
        }

        let result: ChatResponse = response.json().await?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| FintrackError::external_service("LLM", "No response content"))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

const SYSTEM_PROMPT: &str =
    "You are a financial document analyst. You read bank and credit card statements and answer only with valid JSON.";

/// Strip a markdown code fence around a model response, if there is one.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    body[..end].trim()
}

/// Parse untrusted model output into `T`.
///
/// Accepts fenced JSON and JSON surrounded by prose. Any shape mismatch is a
/// `StatementProcessing` error for the caller to absorb.
pub fn parse_json_payload<T: DeserializeOwned>(raw: &str) -> FintrackResult<T> {
    let body = strip_code_fences(raw);

    let first_error = match serde_json::from_str(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // Outermost object or array embedded in prose, earliest opener first
    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| Some((body.find(open)?, body.rfind(close)?)))
        .filter(|(open, close)| open < close)
        .collect();
    spans.sort_unstable();

    for (open, close) in spans {
        if let Ok(value) = serde_json::from_str(&body[open..=close]) {
            return Ok(value);
        }
    }

    Err(FintrackError::statement_processing(format!(
        "Model returned unparseable JSON: {}",
        first_error
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        let plain: Value = parse_json_payload(r#"{"transactions": []}"#).unwrap();
        assert!(plain["transactions"].is_array());

        let fenced: Value = parse_json_payload("```json\n{\"transactions\": [1]}\n```").unwrap();
        assert_eq!(fenced["transactions"][0], 1);
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let value: Value =
            parse_json_payload("Here is the data: {\"bankName\": \"Chase\"} Hope it helps!").unwrap();
        assert_eq!(value["bankName"], "Chase");

        let inline: Value = parse_json_payload("```json{\"ok\": true}```").unwrap();
        assert_eq!(inline["ok"], true);
    }

    #[test]
    fn test_parse_bare_array_surrounded_by_prose() {
        let value: Value = parse_json_payload("Here you go: [{\"a\":1}] done").unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["a"], 1);
    }

    #[test]
    fn test_unparseable_json_is_processing_error() {
        let err = parse_json_payload::<Value>("I could not find any transactions.").unwrap_err();
        assert_eq!(err.error_code(), "STATEMENT_PROCESSING_ERROR");
    }

    #[test]
    fn test_client_requires_credential() {
        let config = fintrack_utils::AppConfig::default().llm;
        assert!(OpenAiClient::new(&config).is_err());

        let mut configured = config;
        configured.api_key = Some("sk-test".to_string());
        assert!(OpenAiClient::new(&configured).is_ok());
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 10,
            temperature: 0.1,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");

        let plain = ChatRequest {
            response_format: None,
            ..request
        };
        assert!(serde_json::to_value(&plain).unwrap().get("response_format").is_none());
    }
}
