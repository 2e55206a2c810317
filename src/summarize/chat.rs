use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{build_prompt, Summarizer, SummarizeError, Summary};
use crate::config::Config;
use crate::transcribe::Transcript;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer for any OpenAI-compatible chat-completions endpoint
pub struct ChatSummarizer {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
    provider_name: &'static str,
}

impl ChatSummarizer {
    /// Build from config, reading the API key from the environment
    pub fn from_config(config: &Config) -> Result<Self, SummarizeError> {
        let env_var = config.api_key_env();
        let api_key = std::env::var(&env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                SummarizeError::Auth(format!(
                    "missing API key for {}: set {}",
                    config.summarize.provider.name(),
                    env_var
                ))
            })?;

        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &Config, api_key: impl Into<String>) -> Result<Self, SummarizeError> {
        let provider = config.summarize.provider;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.summarize.timeout_seconds))
            .build()
            .map_err(|e| SummarizeError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config
                .summarize
                .api_url
                .clone()
                .unwrap_or_else(|| provider.config().api_url.to_string()),
            model: config.summary_model(),
            api_key: api_key.into(),
            provider_name: provider.name(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, text: &Transcript) -> Result<Summary, SummarizeError> {
        if text.is_blank() {
            return Err(SummarizeError::EmptyInput);
        }

        let prompt = build_prompt(text);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.3,
        };

        tracing::debug!(
            "Requesting summary from {} ({}, {} words)",
            self.provider_name,
            self.model,
            text.word_count()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizeError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SummarizeError::Network(format!("failed to read response: {}", e)))?;

        interpret_response(status, &body)
    }

    fn name(&self) -> &'static str {
        self.provider_name
    }
}

/// Map an HTTP response from the chat endpoint to a summary or a failure
pub fn interpret_response(status: StatusCode, body: &str) -> Result<Summary, SummarizeError> {
    if !status.is_success() {
        let message = error_message(body);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SummarizeError::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => SummarizeError::Quota(message),
            _ => SummarizeError::Service {
                status: status.as_u16(),
                message,
            },
        });
    }

    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SummarizeError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(SummarizeError::MalformedResponse(
            "response contained no summary text".to_string(),
        ));
    }

    Ok(Summary::new(content))
}

/// Pull a readable message out of an error body.
/// Some endpoints wrap the error object in a one-element array.
fn error_message(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return truncate(body.trim()),
    };

    let error = match &value {
        serde_json::Value::Array(items) => items.first().and_then(|item| item.get("error")),
        other => other.get("error"),
    };

    error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| truncate(body.trim()))
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_success_is_trimmed() {
        let body = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "  Greeting.\n"}}]}"#;
        let summary = interpret_response(StatusCode::OK, body).unwrap();
        assert_eq!(summary.as_str(), "Greeting.");
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error": {"message": "API key not valid", "code": 401}}"#;
        let err = interpret_response(StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.to_string(), "authentication failed: API key not valid");

        let body = r#"[{"error": {"message": "Resource has been exhausted", "code": 429}}]"#;
        let err = interpret_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Quota);
        assert!(err.to_string().contains("exhausted"));

        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_malformed_responses() {
        let err = interpret_response(StatusCode::OK, "not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let err = interpret_response(StatusCode::OK, r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "   "}}]}"#;
        let err = interpret_response(StatusCode::OK, body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_overrides_from_config() {
        let mut config = Config::default();
        config.summarize.model = Some("gemini-2.0-flash".to_string());
        config.summarize.api_url = Some("http://127.0.0.1:9/v1/chat/completions".to_string());

        let summarizer = ChatSummarizer::with_api_key(&config, "test-key").unwrap();
        assert_eq!(summarizer.model(), "gemini-2.0-flash");
        assert_eq!(summarizer.api_url, "http://127.0.0.1:9/v1/chat/completions");
        assert_eq!(summarizer.name(), "Gemini");
    }

    #[test]
    fn test_missing_key_is_an_auth_failure() {
        let mut config = Config::default();
        config.summarize.api_key_env = Some("VIDSUM_TEST_UNSET_KEY".to_string());

        let err = ChatSummarizer::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("VIDSUM_TEST_UNSET_KEY"));
    }

    #[tokio::test]
    async fn test_blank_transcript_is_rejected_before_request() {
        let summarizer = ChatSummarizer::with_api_key(&Config::default(), "test-key").unwrap();
        let err = summarizer.summarize(&Transcript::from("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}
