//! LLM plumbing for Rex: a provider-agnostic completion contract, an
//! OpenAI-compatible HTTP client, and shared retry/backoff helpers.
//!
//! Rex treats the language model as a drafting collaborator, not an agent:
//! every call is a single system-plus-user exchange whose text lands back in
//! the command layer. Anything that fails here degrades to a canned reply
//! upstream, so the error surface stays small and typed.

mod openai;
mod retry;
mod types;

pub use openai::{
    OpenAiCompletionClient, OpenAiCompletionConfig, DEFAULT_COMPLETION_MODEL,
    DEFAULT_OPENAI_API_BASE,
};
pub use retry::{
    is_retryable_http_error, new_request_id, next_backoff_ms, parse_retry_after_ms, retry_delay_ms,
    should_retry_status, BASE_BACKOFF_MS,
};
pub use types::{
    CompletionClient, CompletionRequest, CompletionResponse, CompletionUsage, RexAiError,
};
