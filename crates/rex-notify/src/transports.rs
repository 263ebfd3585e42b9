use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::json;
use thiserror::Error;

/// Public enum `RexNotifyError` used across Rex components.
#[derive(Debug, Error)]
pub enum RexNotifyError {
    #[error("{channel} delivery is not configured")]
    Disabled { channel: &'static str },
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

/// Trait contract for `SmsTransport` behavior.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), RexNotifyError>;
}

/// Trait contract for `EmailTransport` behavior.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str)
        -> Result<(), RexNotifyError>;
}

#[derive(Debug, Clone)]
pub struct SmsTransportConfig {
    pub endpoint: String,
    pub api_key: String,
    pub from_number: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct EmailTransportConfig {
    pub endpoint: String,
    pub api_key: String,
    pub from_address: String,
    pub request_timeout_ms: u64,
}

fn notify_http_client(api_key: &str, request_timeout_ms: u64) -> Result<reqwest::Client, RexNotifyError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("rex-notify"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| RexNotifyError::InvalidConfig("API key is not header-safe".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    let http = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(request_timeout_ms.max(1)))
        .build()?;
    Ok(http)
}

async fn post_notify_payload(
    http: &reqwest::Client,
    endpoint: &str,
    payload: &serde_json::Value,
) -> Result<(), RexNotifyError> {
    let response = http.post(endpoint).json(payload).send().await?;
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RexNotifyError::HttpStatus { status, body })
}

/// SMS delivery over a JSON gateway endpoint.
pub struct HttpSmsTransport {
    http: reqwest::Client,
    endpoint: String,
    from_number: String,
}

impl HttpSmsTransport {
    pub fn new(config: SmsTransportConfig) -> Result<Self, RexNotifyError> {
        if config.endpoint.trim().is_empty() {
            return Err(RexNotifyError::InvalidConfig(
                "sms endpoint is empty".to_string(),
            ));
        }
        let http = notify_http_client(&config.api_key, config.request_timeout_ms)?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            from_number: config.from_number,
        })
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), RexNotifyError> {
        let payload = json!({
            "from": self.from_number,
            "to": to,
            "body": body,
        });
        post_notify_payload(&self.http, &self.endpoint, &payload).await
    }
}

/// Email delivery over a JSON gateway endpoint.
pub struct HttpEmailTransport {
    http: reqwest::Client,
    endpoint: String,
    from_address: String,
}

impl HttpEmailTransport {
    pub fn new(config: EmailTransportConfig) -> Result<Self, RexNotifyError> {
        if config.endpoint.trim().is_empty() {
            return Err(RexNotifyError::InvalidConfig(
                "email endpoint is empty".to_string(),
            ));
        }
        let http = notify_http_client(&config.api_key, config.request_timeout_ms)?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            from_address: config.from_address,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), RexNotifyError> {
        let payload = json!({
            "from": self.from_address,
            "to": to,
            "subject": subject,
            "body": body,
        });
        post_notify_payload(&self.http, &self.endpoint, &payload).await
    }
}

/// Stand-in used when no SMS gateway is configured. Every send fails with a
/// `Disabled` error so callers surface a setup hint instead of silently
/// dropping the message.
pub struct DisabledSmsTransport;

#[async_trait]
impl SmsTransport for DisabledSmsTransport {
    async fn send_sms(&self, _to: &str, _body: &str) -> Result<(), RexNotifyError> {
        Err(RexNotifyError::Disabled { channel: "sms" })
    }
}

/// Stand-in used when no email gateway is configured.
pub struct DisabledEmailTransport;

#[async_trait]
impl EmailTransport for DisabledEmailTransport {
    async fn send_email(
        &self,
        _to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<(), RexNotifyError> {
        Err(RexNotifyError::Disabled { channel: "email" })
    }
}
