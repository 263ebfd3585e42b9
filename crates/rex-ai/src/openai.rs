use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::retry::{
    is_retryable_http_error, new_request_id, parse_retry_after_ms, retry_delay_ms,
    should_retry_status,
};
use crate::types::{
    CompletionClient, CompletionRequest, CompletionResponse, CompletionUsage, RexAiError,
};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

/// Public struct `OpenAiCompletionConfig` used across Rex components.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for OpenAiCompletionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            api_key: String::new(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            request_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

/// Completion client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiCompletionClient {
    config: OpenAiCompletionConfig,
    http: reqwest::Client,
}

impl OpenAiCompletionClient {
    pub fn new(config: OpenAiCompletionConfig) -> Result<Self, RexAiError> {
        if config.api_key.trim().is_empty() {
            return Err(RexAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| RexAiError::InvalidResponse("API key is not header-safe".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { config, http })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct WireChatResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

fn parse_completion_response(raw: &str) -> Result<CompletionResponse, RexAiError> {
    let wire: WireChatResponse = serde_json::from_str(raw)?;
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RexAiError::InvalidResponse("response contained no choices".to_string()))?;
    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(RexAiError::InvalidResponse(
            "response contained no assistant text".to_string(),
        ));
    }
    let usage = wire
        .usage
        .map(|usage| CompletionUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();
    Ok(CompletionResponse {
        text,
        finish_reason: choice.finish_reason,
        usage,
    })
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, RexAiError> {
        let url = self.chat_completions_url();
        let body = WireChatRequest {
            model: &self.config.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let request_id = new_request_id();
        let max_retries = self.config.max_retries;
        for attempt in 0..=max_retries {
            let send_result = self
                .http
                .post(&url)
                .header("x-rex-request-id", &request_id)
                .header("x-rex-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            let response = match send_result {
                Ok(response) => response,
                Err(error) => {
                    if attempt < max_retries && is_retryable_http_error(&error) {
                        let delay = retry_delay_ms(attempt, None);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }
                    return Err(RexAiError::Http(error));
                }
            };

            let status = response.status().as_u16();
            if (200..300).contains(&status) {
                let raw = response.text().await?;
                return parse_completion_response(&raw);
            }

            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after_ms);
            let body_text = response.text().await.unwrap_or_default();
            if attempt < max_retries && should_retry_status(status) {
                let delay = retry_delay_ms(attempt, retry_after_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }
            return Err(RexAiError::HttpStatus {
                status,
                body: body_text,
            });
        }

        Err(RexAiError::InvalidResponse(
            "retry loop exited without a response".to_string(),
        ))
    }
}
