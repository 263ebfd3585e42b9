use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public struct `CompletionRequest` used across Rex components.
///
/// A single-turn request: a system prompt that frames the collaborator and a
/// user prompt carrying the actual task. Rex never holds multi-turn state on
/// the provider side; conversation memory lives in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn from_prompts(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Public struct `CompletionUsage` used across Rex components.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Public struct `CompletionResponse` used across Rex components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: CompletionUsage,
}

/// Public enum `RexAiError` used across Rex components.
#[derive(Debug, Error)]
pub enum RexAiError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait contract for `CompletionClient` behavior.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, RexAiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_from_prompts_leaves_tuning_unset() {
        let request = CompletionRequest::from_prompts("frame", "task");
        assert_eq!(request.system_prompt, "frame");
        assert_eq!(request.user_prompt, "task");
        assert!(request.max_tokens.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn unit_request_serialization_skips_unset_tuning() {
        let request = CompletionRequest::from_prompts("frame", "task");
        let raw = serde_json::to_string(&request).unwrap();
        assert!(!raw.contains("max_tokens"));
        assert!(!raw.contains("temperature"));
    }
}
