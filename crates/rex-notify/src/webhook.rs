use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;

use crate::transports::RexNotifyError;

const WEBHOOK_RETRY_DELAY_MS: u64 = 250;

/// Event payload pushed to a user's registered webhook. The `event` field is
/// a stable snake_case name; `detail` carries event-specific JSON.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event: String,
    pub user_id: String,
    pub occurred_unix: u64,
    pub detail: serde_json::Value,
}

/// Best-effort webhook delivery with a single bounded retry. Callers treat
/// failures as log-and-continue; a broken webhook must never fail the
/// operation that produced the event.
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(request_timeout_ms: u64) -> Result<Self, RexNotifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("rex-notify"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { http })
    }

    pub async fn notify(&self, url: &str, event: &WebhookEvent) -> Result<(), RexNotifyError> {
        let mut last_error = None;
        for attempt in 0..2u32 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(WEBHOOK_RETRY_DELAY_MS)).await;
            }
            match self.http.post(url).json(event).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    let error = RexNotifyError::HttpStatus { status, body };
                    if status < 500 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(error) => {
                    last_error = Some(RexNotifyError::Http(error));
                }
            }
        }
        Err(last_error.unwrap_or(RexNotifyError::Disabled { channel: "webhook" }))
    }
}
